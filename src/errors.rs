//! Errores tipados del motor. Todos los errores son valores: ninguna regla
//! aborta a sus hermanas y el pipeline los reporta por el mismo canal que
//! las violaciones.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExcelsiorError {
    /// Configuración ausente o malformada. Fatal antes de ejecutar pases.
    #[error("config error: {0}")]
    Config(String),

    /// Archivo fuente que no se pudo parsear. Se reporta como violación
    /// PARSE-ERROR y el archivo queda excluido de la evaluación de reglas.
    #[error("parse error in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Herramienta externa con salida no-cero que no es un reporte de
    /// hallazgos. Se convierte en el bloqueador de su pase.
    #[error("external tool '{tool}' failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    /// Timeout de herramienta externa. Tratado como ExternalTool.
    #[error("external tool '{tool}' timed out after {seconds}s")]
    ExternalToolTimeout { tool: String, seconds: u64 },

    /// El gateway CST rechazó un plan o no pudo escribir el archivo.
    #[error("fix apply error in {}: {reason}", path.display())]
    FixApply { path: PathBuf, reason: String },

    /// La suite de tests falló después de aplicar un fix.
    #[error("validation failure in {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },
}

impl ExcelsiorError {
    /// Código estable para serializar el error junto a las violaciones.
    pub fn code(&self) -> &'static str {
        match self {
            ExcelsiorError::Config(_) => "CONFIG-ERROR",
            ExcelsiorError::Parse { .. } => "PARSE-ERROR",
            ExcelsiorError::ExternalTool { .. } => "TOOL-ERROR",
            ExcelsiorError::ExternalToolTimeout { .. } => "TOOL-TIMEOUT",
            ExcelsiorError::FixApply { .. } => "FIX-APPLY-ERROR",
            ExcelsiorError::Validation { .. } => "VALIDATION-FAILURE",
        }
    }
}
