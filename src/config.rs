mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use take_mut::take;
use time::macros::offset;
use tracing::{debug, info};
use url::Url;

pub use self::types::*;

const DEFAULT_BASE_URL: &str = "https://www.fgeqroo.gob.mx";

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// The site origin that relative resource references are resolved against.
    pub base_url: Url,

    /// Where feed documents are kept between runs.
    pub output_dir: PathBuf,

    pub max_pages: u32,
    pub page_delay: Duration,
    pub utc_offset: Offset,
    pub accept_invalid_certs: bool,
    pub language: String,
    pub publish: PublishConfig,

    #[serde(rename = "source")]
    pub sources: Vec<Source>,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) -> Result<()> {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.output_dir, args.output_dir);
        set_if_some(&mut self.max_pages, args.max_pages);

        if args.no_publish {
            self.publish.enabled = false;
        }

        if !args.sources.is_empty() {
            self.select_sources(&args.sources)?;
        }

        self.validate()
    }

    /// Enables exactly the named sources.
    pub fn select_sources(&mut self, names: &[String]) -> Result<()> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.sources.iter().any(|source| &source.name == *name))
        {
            bail!("there is no source named `{unknown}` in the config");
        }

        for source in &mut self.sources {
            source.enabled = names.contains(&source.name);
        }

        Ok(())
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // do the dance for safety (so that I don't forget to update this after adding new fields).
        take(self, |this| Self {
            base_url: this.base_url,
            output_dir: config_dir.join(this.output_dir),
            max_pages: this.max_pages,
            page_delay: this.page_delay,
            utc_offset: this.utc_offset,
            accept_invalid_certs: this.accept_invalid_certs,
            language: this.language,
            publish: PublishConfig {
                enabled: this.publish.enabled,
                repo_dir: this.publish.repo_dir.map(|dir| config_dir.join(dir)),
            },
            sources: this.sources,
        })
    }

    /// The feed document of a source.
    pub fn state_path(&self, source: &Source) -> PathBuf {
        self.output_dir.join(&source.state_filename)
    }

    /// The working tree that feed documents are committed from.
    pub fn repo_dir(&self) -> &Path {
        self.publish.repo_dir.as_deref().unwrap_or(&self.output_dir)
    }

    fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            bail!("`max-pages` must be at least 1");
        }

        for (idx, source) in self.sources.iter().enumerate() {
            if self.sources[..idx]
                .iter()
                .any(|other| other.name == source.name)
            {
                bail!("the source `{}` is defined more than once", source.name);
            }

            if source.state_filename.as_os_str().is_empty() {
                bail!("the source `{}` has an empty `state-filename`", source.name);
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap(),
            output_dir: ".".into(),
            max_pages: 10,
            page_delay: Duration::from_millis(500),
            utc_offset: offset!(-5).into(),
            accept_invalid_certs: true,
            language: "es".into(),
            publish: Default::default(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<Source> {
    let source = |name: &str, title: &str, description: &str, path: &str| Source {
        name: name.into(),
        title: title.into(),
        description: description.into(),
        root_url: Url::parse(&format!("{DEFAULT_BASE_URL}{path}")).unwrap(),
        state_filename: format!("{name}_feed.xml").into(),
        enabled: true,
    };

    vec![
        source(
            "amber",
            "Alertas Amber Quintana Roo",
            "RSS de personas desaparecidas (Amber) en Quintana Roo",
            "/alertas/Amber",
        ),
        source(
            "extraviado",
            "Personas Extraviadas Quintana Roo",
            "RSS de personas extraviadas en Quintana Roo",
            "/servicio-social/Extraviado",
        ),
        source(
            "alba",
            "Protocolo Alba Quintana Roo",
            "RSS de mujeres desaparecidas (Alba) en Quintana Roo",
            "/protocolos/Alba",
        ),
    ]
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PublishConfig {
    pub enabled: bool,

    /// Defaults to the output directory.
    pub repo_dir: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: None,
        }
    }
}

fn default_source_enabled() -> bool {
    true
}

/// One listing republished as its own feed.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Source {
    pub name: String,
    pub title: String,
    pub description: String,
    pub root_url: Url,
    pub state_filename: PathBuf,

    #[serde(default = "default_source_enabled")]
    pub enabled: bool,
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg = parse(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}

fn parse(contents: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(contents)?;
    cfg.validate()?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse("").unwrap();

        assert_eq!(cfg.base_url.as_str(), "https://www.fgeqroo.gob.mx/");
        assert_eq!(cfg.max_pages, 10);
        assert_eq!(
            std::time::Duration::from(cfg.page_delay),
            std::time::Duration::from_millis(500)
        );
        assert_eq!(cfg.utc_offset.into_inner(), offset!(-5));
        assert!(cfg.accept_invalid_certs);
        assert!(cfg.publish.enabled);
        assert_eq!(
            cfg.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            ["amber", "extraviado", "alba"]
        );
        assert_eq!(
            cfg.sources[2].root_url.as_str(),
            "https://www.fgeqroo.gob.mx/protocolos/Alba"
        );
        assert_eq!(cfg.sources[2].state_filename, Path::new("alba_feed.xml"));
    }

    #[test]
    fn explicit_sources_replace_the_defaults() {
        let cfg = parse(
            r#"
            max-pages = 3
            page-delay = "1s"
            utc-offset = "-06:00"

            [publish]
            enabled = false

            [[source]]
            name = "alba"
            title = "Alba"
            description = "Alba feed"
            root-url = "https://www.fgeqroo.gob.mx/protocolos/Alba"
            state-filename = "alba.xml"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.max_pages, 3);
        assert!(!cfg.publish.enabled);
        assert_eq!(cfg.sources.len(), 1);
        assert!(cfg.sources[0].enabled);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse("max_pages = 3").is_err());
        assert!(parse("max-pages = 0").is_err());
    }

    #[test]
    fn rejects_duplicate_sources() {
        let source = r#"
            [[source]]
            name = "alba"
            title = "Alba"
            description = "Alba feed"
            root-url = "https://www.fgeqroo.gob.mx/protocolos/Alba"
            state-filename = "alba.xml"
        "#;

        assert!(parse(&source.repeat(2)).is_err());
    }

    fn args() -> crate::cli::Args {
        crate::cli::Args {
            config_path: None,
            output_dir: None,
            max_pages: None,
            no_publish: false,
            sources: vec![],
        }
    }

    #[test]
    fn command_line_overrides_are_validated() {
        let mut cfg = Config::default();
        let result = cfg.update(crate::cli::Args {
            max_pages: Some(0),
            ..args()
        });

        assert!(result.is_err());

        let mut cfg = Config::default();
        cfg.update(crate::cli::Args {
            max_pages: Some(3),
            no_publish: true,
            sources: vec!["alba".into()],
            ..args()
        })
        .unwrap();

        assert_eq!(cfg.max_pages, 3);
        assert!(!cfg.publish.enabled);
    }

    #[test]
    fn selecting_sources_disables_the_rest() {
        let mut cfg = Config::default();
        cfg.select_sources(&["alba".into()]).unwrap();

        assert_eq!(
            cfg.sources
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>(),
            ["alba"]
        );
        assert!(cfg.select_sources(&["nonexistent".into()]).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertfeed.toml");
        fs::write(&path, "output-dir = \"feeds\"\n[publish]\nrepo-dir = \"..\"\n").unwrap();

        let cfg = load(&[dir.path().join("missing.toml"), path]).unwrap();

        assert_eq!(cfg.output_dir, dir.path().join("feeds"));
        assert_eq!(cfg.repo_dir(), dir.path().join(".."));
        assert_eq!(
            cfg.state_path(&cfg.sources[0]),
            dir.path().join("feeds").join("amber_feed.xml")
        );
    }

    #[test]
    fn falls_back_to_the_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&[dir.path().join("missing.toml")]).unwrap();

        assert_eq!(cfg.output_dir, Path::new("."));
    }
}
