//! Substitution of `{{name.address}}` references in step arguments

use super::context::DeploymentContext;
use crate::error::{DeployerError, DeployerResult};

use ethers::utils::to_checksum;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

lazy_static! {
    // Whole-string match only: "x-{{A.address}}" stays a literal.
    static ref REFERENCE_PATTERN: Regex =
        Regex::new(r"^\{\{([a-zA-Z0-9_]+)\.address\}\}$").unwrap();
}

/// A `{{objectName.address}}` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    pub object_name: String,
}

impl VariableReference {
    pub fn parse(arg: &str) -> Option<Self> {
        REFERENCE_PATTERN.captures(arg).map(|cap| Self {
            object_name: cap[1].to_string(),
        })
    }
}

/// Replace every reference argument with the address recorded for it.
///
/// Fails on the first name missing from `context`; nothing else is touched.
pub fn resolve_args(args: &[Value], context: &DeploymentContext) -> DeployerResult<Vec<Value>> {
    args.iter()
        .map(|arg| {
            let reference = match arg {
                Value::String(s) => VariableReference::parse(s),
                _ => None,
            };

            match reference {
                Some(reference) => {
                    let entry = context.get(&reference.object_name).ok_or_else(|| {
                        DeployerError::UnresolvedReference {
                            symbol: reference.object_name.clone(),
                        }
                    })?;
                    let address = to_checksum(&entry.address, None);
                    debug!("Resolved {} to {}", arg, address);
                    Ok(Value::String(address))
                }
                None => Ok(arg.clone()),
            }
        })
        .collect()
}
