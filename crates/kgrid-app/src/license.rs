//! License download and app slug derivation.

use serde::Deserialize;

use crate::download::fetch;
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
struct License {
    #[serde(default)]
    spec: LicenseSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseSpec {
    #[serde(default)]
    app_slug: String,
}

/// `GET {endpoint}/license/{app}`, authenticated with the license id as both user and password.
pub async fn download_license(
    http: &reqwest::Client,
    endpoint: &str,
    app: &str,
    license_id: &str,
) -> AppResult<Vec<u8>> {
    let url = format!("{}/license/{app}", endpoint.trim_end_matches('/'));
    fetch(http, &url, Some((license_id, license_id))).await
}

/// Slug of the app a license was issued for.
pub fn app_slug(license: &[u8]) -> AppResult<String> {
    let license: License = serde_yaml::from_slice(license).map_err(AppError::License)?;
    Ok(slugify(&license.spec.app_slug))
}

/// KOTS-compatible slug.
///
/// Transliterated to ASCII and lowercased. `[a-z0-9_]` is kept, `&` and `@`
/// become `and` and `at`, quotes are dropped and every other run of
/// characters collapses to one `-`. Leading and trailing `-`/`_` are trimmed.
pub fn slugify(s: &str) -> String {
    let ascii = deunicode::deunicode(s);
    let mut slug = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        match c {
            'a'..='z' | '0'..='9' | '_' => slug.push(c),
            'A'..='Z' => slug.push(c.to_ascii_lowercase()),
            '&' => slug.push_str("and"),
            '@' => slug.push_str("at"),
            '\'' | '"' => {}
            _ if slug.ends_with('-') => {}
            _ => slug.push('-'),
        }
    }
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}
