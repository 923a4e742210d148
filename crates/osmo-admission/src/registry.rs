//! Docker/OCI registry credential resolution and digest pinning (spec §4.4,
//! `SPEC_FULL.md` Supplemented Feature 5). Grounded in the original's
//! `registry_auth`/`docker_parse` (`examples/original_source/src/lib/utils/common.py`):
//! HEAD the manifest URL, and on 401 read `www-authenticate`, fetch a bearer
//! token from the named `realm` with the response's claims, then retry with
//! the token.

use std::collections::BTreeMap;

use regex::Regex;
use reqwest::{Client, StatusCode};

use crate::error::AdmissionError;

const DEFAULT_REGISTRY: &str = "registry-1.docker.io";
const OCI_IMAGE_INDEX_ENCODING: &str = "application/vnd.oci.image.index.v1+json";
const OCI_IMAGE_MANIFEST_ENCODING: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_MANIFEST_ENCODING: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST_ENCODING: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const DOCKER_AUTH_TOKEN_KEYS: &[&str] = &["token", "access_token"];

/// A parsed `host[:port]/name[:tag][@digest]` docker image reference (spec
/// §4.4, original's `DockerImageInfo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImageInfo {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
    pub original: String,
}

impl DockerImageInfo {
    pub fn reference(&self) -> String {
        self.digest.clone().or_else(|| self.tag.clone()).unwrap_or_else(|| "latest".to_string())
    }

    pub fn manifest_url(&self) -> String {
        format!("https://{}:{}/v2/{}/manifests/{}", self.host, self.port, self.name, self.reference())
    }

    /// The image pinned to a digest (spec §8 invariant 8: "the stored task
    /// image contains `@sha256:…`").
    pub fn pinned(&self, digest: &str) -> String {
        let base = match self.original.split_once('@') {
            Some((before, _)) => before.to_string(),
            None => self.original.clone(),
        };
        format!("{base}@{digest}")
    }
}

/// Parses a docker image reference the way `docker tag` does (spec §4.4).
pub fn docker_parse(image: &str) -> Result<DockerImageInfo, AdmissionError> {
    let re = Regex::new(
        r"^(?:(?P<host>[a-zA-Z0-9.-]+\.[a-zA-Z0-9.-]+|localhost)(?::(?P<port>[0-9]{1,5}))?/)?(?P<name>[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*)(?::(?P<tag>[a-zA-Z0-9_][a-zA-Z0-9._-]*))?(?:@(?P<digest>[A-Za-z0-9_+.-]+:[A-Fa-f0-9]+))?$",
    )
    .expect("static regex is valid");

    let caps = re.captures(image).ok_or_else(|| AdmissionError::BadImageReference(image.to_string()))?;

    let host_raw = caps.name("host").map(|m| m.as_str());
    let host = match host_raw {
        None | Some("docker.io") | Some("") => DEFAULT_REGISTRY.to_string(),
        Some(h) => h.to_string(),
    };
    let port: u16 = caps.name("port").map(|m| m.as_str().parse().unwrap_or(443)).unwrap_or(443);
    let tag = caps.name("tag").map(|m| m.as_str().to_string());
    let digest = caps.name("digest").map(|m| m.as_str().to_string());
    let tag = if tag.is_none() && digest.is_none() { Some("latest".to_string()) } else { tag };

    let mut name = caps
        .name("name")
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AdmissionError::BadImageReference(image.to_string()))?;
    if host_raw.is_none() && !name.contains('/') {
        name = format!("library/{name}");
    }

    Ok(DockerImageInfo { host, port, name, tag, digest, original: image.to_string() })
}

fn parse_www_authenticate(header: &str) -> Result<(String, BTreeMap<String, String>), AdmissionError> {
    let (_, claims_str) = header
        .split_once(' ')
        .ok_or_else(|| AdmissionError::RegistryAuth(header.to_string(), "malformed WWW-Authenticate header".into()))?;
    let claim_re = Regex::new(r#"(?P<key>[a-z]+)="(?P<value>[^"]*)",?"#).expect("static regex is valid");
    let mut claims: BTreeMap<String, String> = claim_re
        .captures_iter(claims_str)
        .map(|c| (c["key"].to_string(), c["value"].to_string()))
        .collect();
    let realm = claims
        .remove("realm")
        .ok_or_else(|| AdmissionError::RegistryAuth(header.to_string(), "missing realm claim".into()))?;
    Ok((realm, claims))
}

/// Hosts for which validation is skipped entirely (spec §4.4 "If a host is
/// in `disable_registry_validation`, skip").
pub fn is_validation_disabled(host: &str, disabled_hosts: &[String]) -> bool {
    disabled_hosts.iter().any(|h| h == host)
}

/// Runs the bearer-token challenge/response flow against `image`'s manifest
/// URL, returning the digest the registry reports (if any) so the caller can
/// pin it (spec §4.4, §8 invariant 8).
pub async fn resolve_and_pin(client: &Client, image: &DockerImageInfo) -> Result<Option<String>, AdmissionError> {
    let url = image.manifest_url();
    let accept = format!(
        "{OCI_IMAGE_INDEX_ENCODING}, {OCI_IMAGE_MANIFEST_ENCODING}, {DOCKER_MANIFEST_ENCODING}, {DOCKER_MANIFEST_LIST_ENCODING}"
    );

    let head = client
        .head(&url)
        .send()
        .await
        .map_err(|e| AdmissionError::RegistryConnection(url.clone(), e.to_string()))?;

    let response = match head.status() {
        StatusCode::OK => head,
        StatusCode::UNAUTHORIZED => {
            let auth_header = head
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| AdmissionError::RegistryAuth(url.clone(), "401 with no WWW-Authenticate header".into()))?
                .to_string();
            let (realm, claims) = parse_www_authenticate(&auth_header)?;

            let auth_response = client
                .get(&realm)
                .query(&claims)
                .send()
                .await
                .map_err(|e| AdmissionError::RegistryConnection(realm.clone(), e.to_string()))?;
            if !auth_response.status().is_success() {
                return Err(AdmissionError::RegistryAuth(url, format!("token endpoint returned {}", auth_response.status())));
            }
            let payload: serde_json::Value =
                auth_response.json().await.map_err(|e| AdmissionError::RegistryAuth(url.clone(), e.to_string()))?;
            let token = DOCKER_AUTH_TOKEN_KEYS
                .iter()
                .find_map(|key| payload.get(key).and_then(|v| v.as_str()))
                .ok_or_else(|| AdmissionError::RegistryAuth(url.clone(), "no token in auth response".into()))?
                .to_string();

            client
                .get(&url)
                .header("Authorization", format!("Bearer {token}"))
                .header("Accept", accept)
                .send()
                .await
                .map_err(|e| AdmissionError::RegistryConnection(url.clone(), e.to_string()))?
        }
        other => {
            return Err(AdmissionError::RegistryAuth(url, format!("unexpected status {other}")));
        }
    };

    if !response.status().is_success() {
        return Err(AdmissionError::RegistryAuth(url, format!("manifest request returned {}", response.status())));
    }

    let content_type = response.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
    let content_digest_header = response.headers().get("docker-content-digest").and_then(|v| v.to_str().ok()).map(str::to_string);

    if content_type.contains("index") || content_type.contains("manifest.list") {
        let body: serde_json::Value =
            response.json().await.map_err(|e| AdmissionError::RegistryAuth(url.clone(), e.to_string()))?;
        Ok(body.get("digest").and_then(|v| v.as_str()).map(str::to_string))
    } else {
        Ok(content_digest_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name_into_dockerhub_library() {
        let info = docker_parse("ubuntu").unwrap();
        assert_eq!(info.host, DEFAULT_REGISTRY);
        assert_eq!(info.name, "library/ubuntu");
        assert_eq!(info.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn parses_host_port_name_tag() {
        let info = docker_parse("registry.example.com:5000/team/app:v1.2.3").unwrap();
        assert_eq!(info.host, "registry.example.com");
        assert_eq!(info.port, 5000);
        assert_eq!(info.name, "team/app");
        assert_eq!(info.tag.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn parses_digest_reference() {
        let info = docker_parse("myimage@sha256:abcd1234").unwrap();
        assert_eq!(info.digest.as_deref(), Some("sha256:abcd1234"));
        assert_eq!(info.reference(), "sha256:abcd1234");
    }

    #[test]
    fn pinned_replaces_any_existing_digest() {
        let info = docker_parse("myimage:v1").unwrap();
        assert_eq!(info.pinned("sha256:deadbeef"), "myimage:v1@sha256:deadbeef");
    }

    #[test]
    fn parses_www_authenticate_claims() {
        let (realm, claims) =
            parse_www_authenticate(r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:x:pull""#)
                .unwrap();
        assert_eq!(realm, "https://auth.example.com/token");
        assert_eq!(claims["service"], "registry.example.com");
        assert_eq!(claims["scope"], "repository:x:pull");
    }

    #[test]
    fn disabled_hosts_skip_validation() {
        let disabled = vec!["registry.internal".to_string()];
        assert!(is_validation_disabled("registry.internal", &disabled));
        assert!(!is_validation_disabled("registry-1.docker.io", &disabled));
    }
}
