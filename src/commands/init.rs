//! Comando `init`: scaffolding de la configuración del proyecto.

use std::path::Path;

use colored::Colorize;

use crate::config::CleanArchConfig;

const STARTER_SECTION: &str = r#"
[tool.clean-arch]
project_type = "generic"
visibility_enforcement = true
silent_layers = ["Domain", "UseCase"]
# layer_map: prefijo punteado -> capa
# [tool.clean-arch.layer_map]
# "app.domain" = "Domain"
# "app.use_cases" = "UseCase"
# "app.interface" = "Interface"
# "app.infrastructure" = "Infrastructure"
"#;

pub fn handle_init(force: bool) {
    let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
    let project_root =
        CleanArchConfig::find_project_root(&cwd).unwrap_or_else(|| cwd.clone());
    println!("🚀 Inicializando excelsior en {}\n", project_root.display());

    match scaffold_config(&project_root, force) {
        Ok(Some(path)) => {
            println!("   ✅ Configuración escrita en {}", path.display().to_string().cyan());
        }
        Ok(None) => {
            println!(
                "   {} Ya existe [tool.clean-arch]; usa --force para regenerar.",
                "ℹ️ ".yellow()
            );
        }
        Err(e) => {
            eprintln!("   {} {e}", "❌".red());
            std::process::exit(2);
        }
    }

    let stubs_dir = project_root.join("stubs");
    if !stubs_dir.exists() {
        if std::fs::create_dir_all(&stubs_dir).is_ok() {
            println!("   ✅ Directorio stubs/ creado (stubs .pyi para el oráculo de tipos)");
        }
    }

    // Marcador py.typed del paquete principal, vía el gateway de planes
    if let Some(pkg) = find_package_dir(&project_root) {
        let gateway = crate::rewrite::CstGateway::new();
        let plans = vec![crate::rules::TransformationPlan::add_py_typed_marker(&pkg)];
        if gateway
            .apply_fixes(&pkg.join("__init__.py"), &plans)
            .unwrap_or(false)
        {
            println!("   ✅ Marcador py.typed creado en {}", pkg.display());
        }
    }
    println!("\n   Siguiente paso: {}", "excelsior check".bold());
}

/// Primer paquete bajo src/ (directorio con __init__.py).
fn find_package_dir(project_root: &Path) -> Option<std::path::PathBuf> {
    let src = project_root.join("src");
    if !src.is_dir() {
        return None;
    }
    let entries = std::fs::read_dir(&src).ok()?;
    for entry in entries.flatten() {
        let p = entry.path();
        if p.is_dir() && p.join("__init__.py").exists() {
            return Some(p);
        }
    }
    None
}

/// Escribe la sección starter. Devuelve None si ya existe y no hay --force.
fn scaffold_config(
    project_root: &Path,
    force: bool,
) -> std::io::Result<Option<std::path::PathBuf>> {
    let pyproject = project_root.join("pyproject.toml");
    if pyproject.exists() {
        let content = std::fs::read_to_string(&pyproject)?;
        if content.contains("[tool.clean-arch]") && !force {
            return Ok(None);
        }
        if content.contains("[tool.clean-arch]") && force {
            // Regeneración: deja el archivo del usuario intacto y escribe el
            // override local.
            let local = project_root.join(".excelsior.toml");
            std::fs::write(&local, STARTER_SECTION.replace("[tool.clean-arch]", "[clean-arch]"))?;
            return Ok(Some(local));
        }
        let mut updated = content;
        if !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(STARTER_SECTION);
        std::fs::write(&pyproject, updated)?;
        return Ok(Some(pyproject));
    }
    let local = project_root.join(".excelsior.toml");
    if local.exists() && !force {
        return Ok(None);
    }
    std::fs::write(&local, STARTER_SECTION.replace("[tool.clean-arch]", "[clean-arch]"))?;
    Ok(Some(local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scaffold_appends_section_to_pyproject() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n")
            .unwrap();
        let written = scaffold_config(tmp.path(), false).unwrap();
        assert!(written.is_some());
        let content = std::fs::read_to_string(tmp.path().join("pyproject.toml")).unwrap();
        assert!(content.contains("[project]"));
        assert!(content.contains("[tool.clean-arch]"));
        // La config resultante carga sin errores
        assert!(CleanArchConfig::load(tmp.path()).is_ok());
    }

    #[test]
    fn test_scaffold_respects_existing_without_force() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("pyproject.toml"),
            "[tool.clean-arch]\nproject_type = \"cli_app\"\n",
        )
        .unwrap();
        let written = scaffold_config(tmp.path(), false).unwrap();
        assert!(written.is_none());
        let content = std::fs::read_to_string(tmp.path().join("pyproject.toml")).unwrap();
        assert!(content.contains("cli_app"), "no pisa la config del usuario");
    }

    #[test]
    fn test_scaffold_without_pyproject_writes_local_file() {
        let tmp = TempDir::new().unwrap();
        let written = scaffold_config(tmp.path(), false).unwrap().unwrap();
        assert!(written.ends_with(".excelsior.toml"));
        assert!(CleanArchConfig::load(tmp.path()).is_ok());
    }
}
