//! # Excelsior — Motor de gobernanza arquitectónica
//!
//! Audita proyectos Python contra invariantes de clean architecture: resuelve
//! la capa de cada módulo, corre un catálogo de ~30 reglas sobre el AST y
//! aplica fixes mecánicos a través de planes de transformación con backup y
//! validación.

use clap::Parser;
use commands::{Cli, Commands};

// Módulos
pub mod adapters;
pub mod artifacts;
pub mod ast;
pub mod audit;
pub mod commands;
pub mod config;
pub mod errors;
pub mod files;
pub mod fixer;
pub mod layers;
pub mod oracle;
pub mod rewrite;
pub mod rules;
pub mod ui;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            commands::init::handle_init(force);
        }
        Commands::Check { path, linter, no_health, format } => {
            commands::check::handle_check(path, linter, no_health, format, cli.quiet);
        }
        Commands::Fix {
            path,
            iterative,
            manual_only,
            comments,
            confirm,
            no_backup,
            no_validate,
        } => {
            commands::fix::handle_fix(
                path,
                iterative,
                manual_only,
                comments,
                confirm,
                no_backup,
                no_validate,
                cli.quiet,
            );
        }
        Commands::Plan { topic } => {
            commands::plan::handle_plan(topic);
        }
        Commands::Verify { baseline } => {
            commands::verify::handle_verify(baseline);
        }
        Commands::Rules => {
            commands::rules::handle_rules();
        }
        Commands::Doctor => {
            commands::doctor::handle_doctor();
        }
    }
}
