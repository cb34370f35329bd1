//! Utilidades de archivos: recorrido del proyecto y nombres de módulo.

use std::path::{Path, PathBuf};

use crate::config::CleanArchConfig;

/// Recorre el árbol y devuelve los archivos .py a auditar, respetando
/// .gitignore y las exclusiones de configuración. Orden determinista.
pub fn collect_python_files(target: &Path, config: &CleanArchConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if target.is_file() {
        if target.extension().and_then(|e| e.to_str()) == Some("py") {
            files.push(target.to_path_buf());
        }
        return files;
    }
    let walker = ignore::WalkBuilder::new(target)
        .hidden(false)
        .git_ignore(true)
        .build();
    for entry in walker.flatten() {
        let p = entry.path();
        if !p.is_file() {
            continue;
        }
        if p.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        let path_str = p.to_string_lossy();
        if path_str.contains("/.venv/")
            || path_str.contains("/site-packages/")
            || path_str.contains("/__pycache__/")
            || path_str.contains("/.excelsior/")
        {
            continue;
        }
        if config.debe_excluir(p) {
            continue;
        }
        files.push(p.to_path_buf());
    }
    files.sort();
    files
}

/// Nombre punteado del módulo relativo a la raíz del proyecto. El prefijo
/// `src/` no forma parte del nombre.
pub fn module_name_for(path: &Path, project_root: &Path) -> String {
    let rel = path.strip_prefix(project_root).unwrap_or(path);
    let mut parts: Vec<String> = Vec::new();
    for comp in rel.components() {
        let seg = comp.as_os_str().to_string_lossy().to_string();
        if parts.is_empty() && seg == "src" {
            continue;
        }
        parts.push(seg);
    }
    if let Some(last) = parts.last_mut() {
        if let Some(stem) = last.strip_suffix(".py") {
            *last = stem.to_string();
        }
    }
    if parts.last().map(|s| s == "__init__").unwrap_or(false) {
        parts.pop();
    }
    parts.join(".")
}

/// ¿El archivo es de tests? (directorio tests/, prefijo test_)
pub fn is_test_file(path: &Path, module_name: &str) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.iter().any(|p| *p == "tests" || *p == "test") {
        return true;
    }
    let file_name = parts.last().copied().unwrap_or("");
    file_name.starts_with("test_")
        || module_name.starts_with("test_")
        || module_name.contains(".tests.")
}

/// ¿El path vive bajo un directorio src/?
pub fn under_src(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_string_lossy() == "src")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_module_name_strips_src_and_extension() {
        let root = Path::new("/proj");
        assert_eq!(
            module_name_for(Path::new("/proj/src/app/use_cases/order.py"), root),
            "app.use_cases.order"
        );
        assert_eq!(
            module_name_for(Path::new("/proj/app/domain/__init__.py"), root),
            "app.domain"
        );
    }

    #[test]
    fn test_is_test_file_variants() {
        assert!(is_test_file(Path::new("tests/unit/test_x.py"), "tests.unit.test_x"));
        assert!(is_test_file(Path::new("src/app/test_helpers.py"), "app.test_helpers"));
        assert!(!is_test_file(Path::new("src/app/order.py"), "app.order"));
    }

    #[test]
    fn test_collect_skips_venv_and_respects_exclusions() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src/app")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".venv/lib")).unwrap();
        std::fs::create_dir_all(tmp.path().join("tests/bait")).unwrap();
        std::fs::write(tmp.path().join("src/app/a.py"), "x = 1\n").unwrap();
        std::fs::write(tmp.path().join(".venv/lib/b.py"), "x = 1\n").unwrap();
        std::fs::write(tmp.path().join("tests/bait/c.py"), "x = 1\n").unwrap();

        let config = CleanArchConfig {
            audit_exclude_paths: vec!["tests/bait".to_string()],
            ..CleanArchConfig::default()
        };
        let files = collect_python_files(tmp.path(), &config);
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.py".to_string()]);
    }
}
