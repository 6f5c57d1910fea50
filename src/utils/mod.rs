pub mod logging;
pub mod process;

pub use process::run_command;

use std::path::{Path, PathBuf};

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Substitutes `{path}` in each argument of a command template.
pub fn render_command(template: &[String], path: &Path) -> Vec<String> {
    let path = path.to_string_lossy();
    template
        .iter()
        .map(|arg| arg.replace("{path}", &path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_leaves_absolute_paths_alone() {
        assert_eq!(expand_home("/srv/notes"), PathBuf::from("/srv/notes"));
        assert_eq!(expand_home("relative/notes"), PathBuf::from("relative/notes"));
    }

    #[test]
    fn expand_home_resolves_tilde_prefix() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~/Notes"), home.join("Notes"));
        assert_eq!(expand_home("~"), home);
    }

    #[test]
    fn render_command_substitutes_every_placeholder() {
        let template = vec![
            "screencapture".to_string(),
            "-x".to_string(),
            "{path}".to_string(),
        ];
        let rendered = render_command(&template, Path::new("/tmp/shot.png"));
        assert_eq!(rendered, vec!["screencapture", "-x", "/tmp/shot.png"]);
    }
}
