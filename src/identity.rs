use anyhow::{anyhow, Context, Result};
use reqwest::Url;

/// Resolves a resource reference scraped from a listing page into the canonical URL that
/// identifies the record.
///
/// Root-relative paths (`/img/x.jpg`) and protocol-relative references (`//host/img/x.jpg`) are
/// resolved against `origin`, so every spelling of the same resource maps to one identity.
pub fn resolve(origin: &Url, src: &str) -> Result<Url> {
    let src = src.trim();

    if src.is_empty() {
        return Err(anyhow!("the resource reference is empty"));
    }

    origin
        .join(src)
        .with_context(|| anyhow!("could not resolve `{src}` against `{origin}`"))
}

/// The durable key of a record: its canonical resource URL.
pub fn identity(resource_url: &Url) -> String {
    resource_url.as_str().to_owned()
}

/// Brings an identity written by another tool into canonical form, so that raw spellings such as
/// `/img/Ana López.jpg` and `/img/Ana%20L%C3%B3pez.jpg` compare equal. Anything that is not an
/// absolute URL is kept verbatim.
pub fn canonicalize(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => identity(&url),
        Err(_) => raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://www.fgeqroo.gob.mx").unwrap()
    }

    #[test]
    fn root_relative_and_absolute_paths_share_an_identity() {
        let relative = resolve(&origin(), "/img/fichas/a.jpg").unwrap();
        let absolute = resolve(&origin(), "https://www.fgeqroo.gob.mx/img/fichas/a.jpg").unwrap();

        assert_eq!(identity(&relative), identity(&absolute));
        assert_eq!(
            identity(&relative),
            "https://www.fgeqroo.gob.mx/img/fichas/a.jpg"
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let url = resolve(&origin(), "  /img/b.jpg\n").unwrap();

        assert_eq!(identity(&url), "https://www.fgeqroo.gob.mx/img/b.jpg");
    }

    #[test]
    fn protocol_relative_references_take_the_origin_scheme() {
        let url = resolve(&origin(), "//www.fgeqroo.gob.mx/img/c.jpg").unwrap();

        assert_eq!(identity(&url), "https://www.fgeqroo.gob.mx/img/c.jpg");
    }

    #[test]
    fn foreign_hosts_keep_their_own_identity() {
        let url = resolve(&origin(), "https://cdn.example.org/img/d.jpg").unwrap();

        assert_eq!(identity(&url), "https://cdn.example.org/img/d.jpg");
    }

    #[test]
    fn raw_and_encoded_spellings_canonicalize_alike() {
        let scraped = resolve(&origin(), "/img/Ana López.jpg").unwrap();

        assert_eq!(
            canonicalize("https://www.fgeqroo.gob.mx/img/Ana López.jpg"),
            identity(&scraped)
        );
        assert_eq!(
            canonicalize("https://www.fgeqroo.gob.mx/img/Ana%20L%C3%B3pez.jpg"),
            identity(&scraped)
        );
        assert_eq!(canonicalize("not a url"), "not a url");
    }

    #[test]
    fn empty_references_are_rejected() {
        assert!(resolve(&origin(), "   ").is_err());
    }
}
