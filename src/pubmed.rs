//! PubMed document source.
//!
//! Talks to the NCBI E-utilities: `esearch` to find matching PMIDs
//! (relevance-sorted, JSON), then `efetch` to pull the article records (XML).

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::PubMedConfig;
use crate::errors::ApiError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Where candidate documents come from. PubMed in production; tests substitute
/// fixed corpora.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Article>, ApiError>;
}

/// One bibliographic record. Immutable once parsed; lives only for the
/// duration of a single request.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
}

#[derive(Clone)]
pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    config: PubMedConfig,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            config,
        })
    }

    async fn esearch(&self, query: &str) -> Result<Vec<String>, ApiError> {
        let mut url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&sort=relevance&retmode=json",
            self.base_url,
            urlencoding::encode(query),
            self.config.retmax
        );
        self.append_credentials(&mut url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "PubMed esearch failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let ids = payload
            .get("esearchresult")
            .and_then(|v| v.get("idlist"))
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|item| item.as_str())
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(ids)
    }

    async fn efetch(&self, ids: &[String]) -> Result<Vec<Article>, ApiError> {
        let mut url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&rettype=xml&retmode=xml",
            self.base_url,
            ids.join(",")
        );
        self.append_credentials(&mut url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "PubMed efetch failed: {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(ApiError::upstream)?;
        parse_pubmed_xml(&body)
    }

    fn append_credentials(&self, url: &mut String) {
        if !self.config.api_key.is_empty() {
            url.push_str("&api_key=");
            url.push_str(&urlencoding::encode(&self.config.api_key));
        }
        if !self.config.email.is_empty() {
            url.push_str("&email=");
            url.push_str(&urlencoding::encode(&self.config.email));
        }
    }
}

#[async_trait]
impl DocumentSource for PubMedClient {
    /// Searches PubMed and fetches full records for the matching PMIDs.
    /// Any network or decode failure surfaces to the caller; no retries here.
    async fn search(&self, query: &str) -> Result<Vec<Article>, ApiError> {
        let ids = self.esearch(query).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.efetch(&ids).await
    }
}

/// Extracts `Article` records from an efetch XML payload.
///
/// Title and abstract text are accumulated across nested markup (PubMed uses
/// inline `<i>`, `<sub>`, etc.); multiple `AbstractText` sections are joined
/// with a single space. Authors come out as "LastName ForeName".
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<Article>, ApiError> {
    // Text is deliberately not trimmed while reading: titles and abstracts
    // span inline markup and the whitespace between fragments is significant.
    let mut reader = Reader::from_str(xml);

    let mut articles = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let mut pmid = String::new();
    let mut title = String::new();
    let mut abstract_parts: Vec<String> = Vec::new();
    let mut authors: Vec<String> = Vec::new();
    let mut last_name = String::new();
    let mut fore_name = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                if name == "PubmedArticle" {
                    pmid.clear();
                    title.clear();
                    abstract_parts.clear();
                    authors.clear();
                } else if name == "AbstractText" {
                    abstract_parts.push(String::new());
                } else if name == "Author" {
                    last_name.clear();
                    fore_name.clear();
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                match path.last().map(String::as_str) {
                    Some("Author") => {
                        let full = format!("{} {}", last_name.trim(), fore_name.trim());
                        let full = full.trim().to_string();
                        if !full.is_empty() {
                            authors.push(full);
                        }
                    }
                    Some("PubmedArticle") => {
                        articles.push(Article {
                            pmid: pmid.trim().to_string(),
                            title: title.trim().to_string(),
                            abstract_text: abstract_parts.join(" ").trim().to_string(),
                            authors: std::mem::take(&mut authors),
                        });
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(ApiError::internal)?;
                route_text(
                    &path,
                    &value,
                    &mut pmid,
                    &mut title,
                    &mut abstract_parts,
                    &mut last_name,
                    &mut fore_name,
                );
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ApiError::Upstream(format!("PubMed XML parse: {}", err))),
        }
    }

    Ok(articles)
}

fn route_text(
    path: &[String],
    value: &str,
    pmid: &mut String,
    title: &mut String,
    abstract_parts: &mut [String],
    last_name: &mut String,
    fore_name: &mut String,
) {
    let in_path = |name: &str| path.iter().any(|segment| segment == name);

    // The first PMID under MedlineCitation identifies the article; PMIDs also
    // appear later inside reference lists and must not overwrite it.
    if path.last().map(String::as_str) == Some("PMID")
        && in_path("MedlineCitation")
        && !in_path("CommentsCorrectionsList")
        && pmid.is_empty()
    {
        pmid.push_str(value);
    } else if in_path("ArticleTitle") {
        title.push_str(value);
    } else if in_path("AbstractText") {
        if let Some(part) = abstract_parts.last_mut() {
            part.push_str(value);
        }
    } else if in_path("Author") {
        match path.last().map(String::as_str) {
            Some("LastName") => last_name.push_str(value),
            Some("ForeName") => fore_name.push_str(value),
            _ => {}
        }
    }
}
