pub mod table {
    fn sep(widths: &[usize]) -> String {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s
    }

    // Cells are padded by char count so non-ASCII ids stay aligned.
    fn line(cells: &[&str], widths: &[usize]) -> String {
        let mut s = String::from("|");
        for (cell, w) in cells.iter().zip(widths) {
            let pad = w.saturating_sub(cell.chars().count());
            s.push(' ');
            s.push_str(cell);
            s.push_str(&" ".repeat(pad));
            s.push_str(" |");
        }
        s
    }

    /// Render an ASCII table. Missing cells are blank, extra cells are dropped.
    #[must_use]
    pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
        let cols = headers.len();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (cell, w) in row.iter().take(cols).zip(widths.iter_mut()) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let rule = sep(&widths);
        let mut out = vec![rule.clone(), line(headers, &widths), rule.clone()];
        for row in rows {
            let cells: Vec<&str> =
                (0..cols).map(|i| row.get(i).map_or("", String::as_str)).collect();
            out.push(line(&cells, &widths));
        }
        out.push(rule);
        out.join("\n")
    }
}

pub mod config {
    use serde::Deserialize;
    use std::fs;
    use std::path::{Path, PathBuf};

    /// File name looked up by `load_config_near`.
    pub const CONFIG_FILE_NAME: &str = "depquery.toml";

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct GraphConfig {
        /// Snapshot path; relative paths are taken from the config file's directory.
        pub path: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct QueryConfig {
        pub default_format: Option<String>, // "text" | "json"
        pub build_kind: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct Config {
        pub graph: Option<GraphConfig>,
        pub query: Option<QueryConfig>,
        #[serde(skip)]
        pub source: Option<PathBuf>,
    }

    impl Config {
        /// Configured snapshot path, resolved against the config file location.
        #[must_use]
        pub fn graph_path(&self) -> Option<PathBuf> {
            let path = self.graph.as_ref()?.path.as_ref()?;
            let base = self.source.as_deref().and_then(Path::parent);
            Some(match base {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.clone(),
            })
        }

        #[must_use]
        pub fn default_format(&self) -> Option<&str> {
            self.query.as_ref()?.default_format.as_deref()
        }

        #[must_use]
        pub fn build_kind(&self) -> Option<&str> {
            self.query.as_ref()?.build_kind.as_deref()
        }
    }

    /// Read and parse a config file. Missing or malformed files yield `None`.
    #[must_use]
    pub fn load_config_at(path: &Path) -> Option<Config> {
        let data = fs::read_to_string(path).ok()?;
        match toml::from_str::<Config>(&data) {
            Ok(mut cfg) => {
                cfg.source = Some(path.to_path_buf());
                Some(cfg)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed config");
                None
            }
        }
    }

    /// Look for `depquery.toml` in `dir`.
    #[must_use]
    pub fn load_config_near(dir: &Path) -> Option<Config> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            load_config_at(&path)
        } else {
            None
        }
    }
}

pub mod logging {
    use tracing::Level;

    /// Install the stderr subscriber. Later calls are no-ops.
    pub fn init(verbose: bool) {
        let level = if verbose { Level::DEBUG } else { Level::ERROR };
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}
