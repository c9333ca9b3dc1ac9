//! Typed access to raw STEP record arguments.

use crate::error::StepError;
use crate::graph::{RawEntity, StepValue};

/// Helper trait for extracting argument values from raw records.
pub trait EntityArgs {
    /// Get a required real argument at index.
    fn real(&self, idx: usize) -> Result<f64, StepError>;

    /// Get a required integer argument at index.
    fn integer(&self, idx: usize) -> Result<i64, StepError>;

    /// Get a required string argument at index.
    fn string(&self, idx: usize) -> Result<&str, StepError>;

    /// Get a required enum argument at index.
    fn enumeration(&self, idx: usize) -> Result<&str, StepError>;

    /// Get a required entity reference at index.
    fn entity_ref(&self, idx: usize) -> Result<u64, StepError>;

    /// Get a required list argument at index.
    fn list(&self, idx: usize) -> Result<&[StepValue], StepError>;

    /// Get a list of reals at index.
    fn real_list(&self, idx: usize) -> Result<Vec<f64>, StepError>;

    /// Get a list of entity references at index.
    fn entity_ref_list(&self, idx: usize) -> Result<Vec<u64>, StepError>;

    /// Check if the argument at index is null (`$`) or absent.
    fn is_null(&self, idx: usize) -> bool;
}

impl EntityArgs for RawEntity {
    fn real(&self, idx: usize) -> Result<f64, StepError> {
        self.args.get(idx).and_then(|v| v.as_real()).ok_or_else(|| {
            StepError::parser(
                Some(self.id),
                format!("expected real at arg {idx} in {}", self.type_name),
            )
        })
    }

    fn integer(&self, idx: usize) -> Result<i64, StepError> {
        self.args
            .get(idx)
            .and_then(|v| v.as_integer())
            .ok_or_else(|| {
                StepError::parser(
                    Some(self.id),
                    format!("expected integer at arg {idx} in {}", self.type_name),
                )
            })
    }

    fn string(&self, idx: usize) -> Result<&str, StepError> {
        self.args
            .get(idx)
            .and_then(|v| v.as_string())
            .ok_or_else(|| {
                StepError::parser(
                    Some(self.id),
                    format!("expected string at arg {idx} in {}", self.type_name),
                )
            })
    }

    fn enumeration(&self, idx: usize) -> Result<&str, StepError> {
        self.args
            .get(idx)
            .and_then(|v| v.as_enum())
            .ok_or_else(|| {
                StepError::parser(
                    Some(self.id),
                    format!("expected enum at arg {idx} in {}", self.type_name),
                )
            })
    }

    fn entity_ref(&self, idx: usize) -> Result<u64, StepError> {
        self.args
            .get(idx)
            .and_then(|v| v.as_entity_ref())
            .ok_or_else(|| {
                StepError::parser(
                    Some(self.id),
                    format!("expected entity ref at arg {idx} in {}", self.type_name),
                )
            })
    }

    fn list(&self, idx: usize) -> Result<&[StepValue], StepError> {
        self.args.get(idx).and_then(|v| v.as_list()).ok_or_else(|| {
            StepError::parser(
                Some(self.id),
                format!("expected list at arg {idx} in {}", self.type_name),
            )
        })
    }

    fn real_list(&self, idx: usize) -> Result<Vec<f64>, StepError> {
        let list = self.list(idx)?;
        list.iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_real().ok_or_else(|| {
                    StepError::parser(
                        Some(self.id),
                        format!("expected real at list[{i}] in arg {idx}"),
                    )
                })
            })
            .collect()
    }

    fn entity_ref_list(&self, idx: usize) -> Result<Vec<u64>, StepError> {
        let list = self.list(idx)?;
        list.iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_entity_ref().ok_or_else(|| {
                    StepError::parser(
                        Some(self.id),
                        format!("expected entity ref at list[{i}] in arg {idx}"),
                    )
                })
            })
            .collect()
    }

    fn is_null(&self, idx: usize) -> bool {
        self.args.get(idx).map(|v| v.is_null()).unwrap_or(true)
    }
}

/// Expand a list of integer multiplicities.
pub fn integer_list(entity: &RawEntity, idx: usize) -> Result<Vec<usize>, StepError> {
    let list = entity.list(idx)?;
    list.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_integer().map(|n| n.max(0) as usize).ok_or_else(|| {
                StepError::parser(
                    Some(entity.id),
                    format!("expected integer at list[{i}] in arg {idx}"),
                )
            })
        })
        .collect()
}
