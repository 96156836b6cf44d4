//! Restricted formula evaluation
//!
//! Formulas are parsed once into an evalexpr operator tree. Only the raw
//! value `x` and the whitelisted functions below may appear; anything else
//! is rejected when the configuration is loaded, so an edited formula can
//! never reach arbitrary built-ins at runtime.

use crate::config::FormulaRangeConfig;
use crate::error::{CalcError, Result};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Node, Value,
};

/// Name of the variable bound to the raw value
pub const RAW_VARIABLE: &str = "x";

/// Functions a calibration formula may call
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "scale", "clamp", "abs", "min", "max", "round", "sqrt", "ln", "exp",
];

/// A precompiled formula over the raw value `x`
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    tree: Node,
    /// Whitelisted functions; `x` is bound per evaluation on a copy
    functions: HashMapContext,
}

impl Formula {
    /// Parse and validate a formula
    pub fn compile(source: &str) -> Result<Self> {
        let tree = evalexpr::build_operator_tree(source)
            .map_err(|e| CalcError::invalid_formula(source, format!("parse failed: {}", e)))?;

        if let Some(var) = tree
            .iter_variable_identifiers()
            .find(|name| *name != RAW_VARIABLE)
        {
            return Err(CalcError::invalid_formula(
                source,
                format!("unknown variable '{}'", var),
            ));
        }
        if let Some(func) = tree
            .iter_function_identifiers()
            .find(|name| !ALLOWED_FUNCTIONS.contains(name))
        {
            return Err(CalcError::invalid_formula(
                source,
                format!("disallowed function '{}'", func),
            ));
        }

        let mut functions = HashMapContext::new();
        register_functions(&mut functions)?;

        Ok(Self {
            source: source.to_string(),
            tree,
            functions,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `x` bound to the raw value
    pub fn eval(&self, raw: f64) -> Result<f64> {
        let mut context = self.functions.clone();
        context
            .set_value(RAW_VARIABLE.to_string(), Value::Float(raw))
            .map_err(|e| CalcError::expression(format!("Failed to bind x: {}", e)))?;

        let value = self.tree.eval_with_context(&context).map_err(|e| {
            CalcError::expression(format!("Failed to evaluate '{}': {}", self.source, e))
        })?;

        let result = match value {
            Value::Float(f) => f,
            Value::Int(i) => i as f64,
            other => {
                return Err(CalcError::expression(format!(
                    "'{}' did not evaluate to a number: {:?}",
                    self.source, other
                )))
            },
        };

        if !result.is_finite() {
            return Err(CalcError::expression(format!(
                "'{}' produced a non-finite result for x = {}",
                self.source, raw
            )));
        }
        Ok(result)
    }
}

/// Ordered formula sub-ranges of one sensor type
#[derive(Debug, Clone)]
pub struct RangedFormulas {
    ranges: Vec<(f64, f64, Formula)>,
}

impl RangedFormulas {
    pub fn compile(configs: &[FormulaRangeConfig]) -> Result<Self> {
        let mut ranges = Vec::with_capacity(configs.len());
        for cfg in configs {
            if !(cfg.raw_min < cfg.raw_max) {
                return Err(CalcError::invalid_rule(format!(
                    "formula range [{}, {}) is empty",
                    cfg.raw_min, cfg.raw_max
                )));
            }
            ranges.push((cfg.raw_min, cfg.raw_max, Formula::compile(&cfg.formula)?));
        }
        Ok(Self { ranges })
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Evaluate the first range whose `[raw_min, raw_max)` contains `raw`
    pub fn eval(&self, raw: f64) -> Result<f64> {
        let (_, _, formula) = self
            .ranges
            .iter()
            .find(|(min, max, _)| raw >= *min && raw < *max)
            .ok_or(CalcError::NoMatchingRange(raw))?;
        formula.eval(raw)
    }
}

fn to_f64(value: &Value) -> std::result::Result<f64, EvalexprError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        _ => Err(EvalexprError::expected_number(value.clone())),
    }
}

fn unary(f: fn(f64) -> f64) -> Function {
    Function::new(move |arg| Ok(Value::Float(f(to_f64(arg)?))))
}

fn register_functions(context: &mut HashMapContext) -> Result<()> {
    let functions: Vec<(&str, Function)> = vec![
        (
            "scale",
            Function::new(|args| {
                let tuple = args.as_fixed_len_tuple(2)?;
                Ok(Value::Float(to_f64(&tuple[0])? * to_f64(&tuple[1])?))
            }),
        ),
        (
            "clamp",
            Function::new(|args| {
                let tuple = args.as_fixed_len_tuple(3)?;
                let (value, min, max) = (
                    to_f64(&tuple[0])?,
                    to_f64(&tuple[1])?,
                    to_f64(&tuple[2])?,
                );
                Ok(Value::Float(value.max(min).min(max)))
            }),
        ),
        (
            "min",
            Function::new(|args| {
                let tuple = args.as_fixed_len_tuple(2)?;
                Ok(Value::Float(to_f64(&tuple[0])?.min(to_f64(&tuple[1])?)))
            }),
        ),
        (
            "max",
            Function::new(|args| {
                let tuple = args.as_fixed_len_tuple(2)?;
                Ok(Value::Float(to_f64(&tuple[0])?.max(to_f64(&tuple[1])?)))
            }),
        ),
        (
            "round",
            Function::new(|args| {
                let tuple = args.as_fixed_len_tuple(2)?;
                let value = to_f64(&tuple[0])?;
                let factor = 10_f64.powi(tuple[1].as_int()? as i32);
                Ok(Value::Float((value * factor).round() / factor))
            }),
        ),
        ("abs", unary(f64::abs)),
        ("sqrt", unary(f64::sqrt)),
        ("ln", unary(f64::ln)),
        ("exp", unary(f64::exp)),
    ];

    for (name, function) in functions {
        context
            .set_function(name.to_string(), function)
            .map_err(|e| CalcError::expression(format!("Failed to register {}: {}", name, e)))?;
    }
    Ok(())
}
