use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const MAX_REASON_LEN: usize = 500;

/// Tag that marks a bank movement as non-operational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Transfer between the company's own accounts.
    Transferencia,
    /// Bank fee or charge.
    TarifaBancaria,
    /// Interest or investment yield.
    Rendimento,
    /// Anything else; requires a reason.
    Outro,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::Transferencia => "transferencia",
            ExceptionKind::TarifaBancaria => "tarifa_bancaria",
            ExceptionKind::Rendimento => "rendimento",
            ExceptionKind::Outro => "outro",
        }
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, ExceptionKind::Outro)
    }
}

impl std::str::FromStr for ExceptionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "transferencia" => Ok(ExceptionKind::Transferencia),
            "tarifa_bancaria" => Ok(ExceptionKind::TarifaBancaria),
            "rendimento" => Ok(ExceptionKind::Rendimento),
            "outro" => Ok(ExceptionKind::Outro),
            other => Err(AppError::Validation(format!(
                "Unknown classification '{}'",
                other
            ))),
        }
    }
}

/// A user decision to exclude a transaction from matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ExceptionKind,
    pub ignore: bool,
    pub reason: Option<String>,
}

impl Classification {
    pub fn new(kind: ExceptionKind, ignore: bool, reason: Option<String>) -> Self {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        Self {
            kind,
            ignore,
            reason,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind.requires_reason() && self.reason.is_none() {
            return Err(AppError::Validation(
                "A reason is required when classifying as 'outro'".to_string(),
            ));
        }

        if let Some(reason) = &self.reason {
            if reason.chars().count() > MAX_REASON_LEN {
                return Err(AppError::Validation(format!(
                    "Reason must be at most {} characters",
                    MAX_REASON_LEN
                )));
            }
        }

        Ok(())
    }
}
