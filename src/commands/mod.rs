pub mod check;
pub mod doctor;
pub mod fix;
pub mod init;
pub mod plan;
pub mod rules;
pub mod verify;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "excelsior")]
#[command(about = "Motor de gobernanza arquitectónica para proyectos Python", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Salida mínima
    #[arg(long, global = true)]
    pub quiet: bool,
    /// Salida detallada
    #[arg(long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inicializa la configuración [tool.clean-arch] del proyecto
    Init {
        /// Sobrescribe la configuración existente
        #[arg(long)]
        force: bool,
    },
    /// Corre la auditoría completa con compuertas (exit 0 si no bloquea)
    Check {
        /// Path a auditar (default: src/ del proyecto)
        path: Option<String>,
        /// Restringe a un linter: all, import_linter, ruff, mypy, excelsior
        #[arg(long, default_value = "all")]
        linter: String,
        /// No duplica los artefactos bajo health/
        #[arg(long)]
        no_health: bool,
        /// Formato de salida: text o json
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Aplica los cinco pases de fixes (2 de ellos gated por auditoría limpia)
    Fix {
        /// Path a reparar (default: src/ del proyecto)
        path: Option<String>,
        /// Repite los pases hasta que no haya cambios
        #[arg(long)]
        iterative: bool,
        /// Solo reporta instrucciones manuales, sin tocar archivos
        #[arg(long)]
        manual_only: bool,
        /// Solo el pase de comentarios de gobernanza
        #[arg(long)]
        comments: bool,
        /// Pide confirmación por archivo
        #[arg(long)]
        confirm: bool,
        /// No crea backups .bak
        #[arg(long)]
        no_backup: bool,
        /// No valida con la suite de tests después de cada archivo
        #[arg(long)]
        no_validate: bool,
    },
    /// Genera el plan de fix en markdown para una regla
    Plan {
        /// Código o símbolo de la regla (ej. W9006, law-of-demeter)
        topic: Option<String>,
    },
    /// Verifica el estado del audit contra el baseline guardado
    Verify {
        /// Guarda el estado actual como baseline
        #[arg(long)]
        baseline: bool,
    },
    /// Lista las reglas activas del catálogo
    Rules,
    /// Diagnostica el entorno (config, herramientas externas, parser)
    Doctor,
}
