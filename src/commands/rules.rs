//! Comando `rules`: tabla de reglas activas desde el catálogo.

use colored::Colorize;

use crate::rules::registry::RuleRegistry;

pub fn handle_rules() {
    let registry = match RuleRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Catálogo de reglas inválido: {e}", "❌".red());
            std::process::exit(2);
        }
    };
    println!("\n{}", "Reglas activas:".bold());
    for (code, def) in registry.definitions() {
        let mut marks = String::new();
        if def.fixable {
            marks.push_str(" [fix]");
        }
        if def.comment_only {
            marks.push_str(" [comment]");
        }
        if def.severity.as_deref() == Some("info") {
            marks.push_str(" [info]");
        }
        println!(
            "  {:<7} {:<28} {}{}",
            code.yellow(),
            def.symbol,
            def.display_name,
            marks.green()
        );
    }
    println!(
        "\n   Info: fixable/comment-only vienen del catálogo embebido; los\n   umbrales se ajustan en [tool.clean-arch] del pyproject.toml."
    );
}
