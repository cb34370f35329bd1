//! Comando `fix`: los cinco pases del pipeline de reparación.

use colored::Colorize;
use dialoguer::Confirm;

use crate::artifacts::ArtifactStore;
use crate::ast::ModuleCache;
use crate::audit::AuditPipeline;
use crate::commands::check::resolve_target;
use crate::config::CleanArchConfig;
use crate::fixer::{FixOptions, FixPipeline};
use crate::rules::registry::RuleRegistry;

#[allow(clippy::too_many_arguments)]
pub fn handle_fix(
    path: Option<String>,
    iterative: bool,
    manual_only: bool,
    comments: bool,
    confirm: bool,
    no_backup: bool,
    no_validate: bool,
    quiet: bool,
) {
    let (project_root, target) = resolve_target(path.as_deref());
    let config = match CleanArchConfig::load(&project_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} Configuración inválida: {e}", "❌".red());
            std::process::exit(2);
        }
    };
    let registry = match RuleRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Catálogo de reglas inválido: {e}", "❌".red());
            std::process::exit(2);
        }
    };

    if !quiet {
        println!("🔧 Pipeline de fixes sobre {}\n", target.display().to_string().cyan());
    }

    if manual_only {
        report_manual_fixes(&project_root, &target, &config, &registry);
        return;
    }

    if confirm && !quiet {
        let seguir = Confirm::new()
            .with_prompt(format!("¿Aplicar fixes sobre {}?", target.display()))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !seguir {
            println!("   ⏭️  Cancelado por el usuario.");
            return;
        }
    }

    let options = FixOptions {
        create_backups: !no_backup,
        cleanup_backups: true,
        validate_with_tests: !no_validate,
        comments_only: comments,
    };

    let audit = AuditPipeline::new(&config, &registry, &project_root);
    let mut fixer = FixPipeline::new(&config, &registry, &project_root);
    let mut total_modified = 0usize;
    let max_rounds = if iterative { 5 } else { 1 };

    for round in 1..=max_rounds {
        if iterative && !quiet {
            println!("{}", format!("— Ronda {round} —").bold());
        }
        let mut cache = ModuleCache::new();
        let summary = fixer.run(&target, &audit, &mut cache, &options);

        if !quiet {
            for pass in &summary.passes {
                match &pass.skipped_reason {
                    Some(reason) => {
                        println!("   ⚠️  {}", reason.yellow());
                    }
                    None => {
                        println!(
                            "   ✅ Pase {} ({}): {} archivo(s) modificados",
                            pass.number, pass.name, pass.files_modified
                        );
                    }
                }
            }
            if !summary.failed_fixes.is_empty() {
                println!(
                    "   ⚠️  {} fix(es) no se pudieron aplicar:",
                    summary.failed_fixes.len()
                );
                for failure in &summary.failed_fixes {
                    println!("      {}", failure.dimmed());
                }
            }
        }

        // Handover post-fix con los motivos de fallo de inferencia
        let mut post_cache = ModuleCache::new();
        let outcome = audit.run(&target, &mut post_cache);
        let store = ArtifactStore::new(&project_root);
        let _ = store.save_audit_trail(&outcome, &registry, "fix");
        let _ = store.save_handover(&outcome, &registry, &summary.fix_failures, "fix");

        let round_modified = summary.total_modified();
        total_modified += round_modified;
        if round_modified == 0 {
            break;
        }
    }

    if !quiet {
        println!(
            "\n🛠️  Fix suite completa. Archivos reparados: {}",
            total_modified.to_string().green().bold()
        );
    }
}

/// --manual-only: sin tocar archivos, lista las instrucciones manuales de
/// cada regla con hallazgos.
fn report_manual_fixes(
    project_root: &std::path::Path,
    target: &std::path::Path,
    config: &CleanArchConfig,
    registry: &RuleRegistry,
) {
    let pipeline = AuditPipeline::new(config, registry, project_root);
    let mut cache = ModuleCache::new();
    let pass = pipeline.run_architectural(target, &mut cache);
    let mut seen: Vec<String> = Vec::new();
    for v in &pass.violations {
        if seen.contains(&v.code) {
            continue;
        }
        seen.push(v.code.clone());
        let display = registry.display_name(&v.code);
        println!("\n{} {} — {}", "📋".cyan(), v.code.yellow().bold(), display.bold());
        if let Some(instructions) = registry.manual_instructions(&v.code) {
            println!("   {instructions}");
        }
        let count = pass.violations.iter().filter(|x| x.code == v.code).count();
        println!("   {} ocurrencia(s)", count);
    }
    if seen.is_empty() {
        println!("✅ Sin violaciones arquitectónicas que reportar.");
    }
}
