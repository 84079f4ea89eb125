//! Blocking GitHub GraphQL client for gist listing.

use crate::model::gist::GistItem;
use crate::sync::provider::{ItemSource, SourceError, SourceResult};
use chrono::{DateTime, Utc};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

static GIST_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z_-]+$").expect("valid gist name regex"));

const GISTS_QUERY: &str = "query($first: Int!, $after: String) {
  viewer {
    login
    gists(first: $first, after: $after, privacy: ALL, orderBy: {field: PUSHED_AT, direction: DESC}) {
      pageInfo { endCursor hasNextPage }
      nodes { id name description pushedAt }
    }
  }
}";

/// Connection settings for `GistClient`.
#[derive(Debug, Clone)]
pub struct GistClientOptions {
    pub token: String,
    pub graphql_url: String,
    pub gist_base_url: String,
    pub page_size: u32,
    pub timeout: Duration,
}

/// Gist source backed by the GitHub GraphQL API.
#[derive(Clone)]
pub struct GistClient {
    client: Client,
    graphql_url: String,
    gist_base_url: String,
    page_size: u32,
}

impl GistClient {
    pub fn new(options: GistClientOptions) -> SourceResult<Self> {
        let token = options.token.trim();
        if token.is_empty() {
            return Err(SourceError::Api("missing GitHub token".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SourceError::Api("GitHub token is not a valid header".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gistnote/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            graphql_url: options.graphql_url,
            gist_base_url: options.gist_base_url.trim_end_matches('/').to_string(),
            page_size: options.page_size.clamp(1, 100),
        })
    }

    fn query_page(&self, after: Option<&str>) -> SourceResult<ViewerGists> {
        let request = GraphQlRequest {
            query: GISTS_QUERY,
            variables: GistsVariables {
                first: self.page_size,
                after,
            },
        };
        let response = self.client.post(&self.graphql_url).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GraphQlResponse = response.json()?;
        if let Some(errors) = parsed.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|err| err.message).collect();
            return Err(SourceError::Api(messages.join("; ")));
        }
        parsed
            .data
            .map(|data| data.viewer)
            .ok_or_else(|| SourceError::InvalidResponse("response has no data".to_string()))
    }

    fn to_item(&self, login: &str, node: GistNode) -> SourceResult<GistItem> {
        if !GIST_NAME_RE.is_match(&node.name) {
            return Err(SourceError::InvalidResponse(format!(
                "gist `{}` has a non url-safe name `{}`",
                node.id, node.name
            )));
        }
        Ok(GistItem {
            url: format!("{}/{}", self.gist_base_url, node.name),
            content_ref: format!("{}/{}/{}/raw", self.gist_base_url, login, node.name),
            id: node.id,
            name: node.name,
            description: node.description.unwrap_or_default(),
            pushed_at: node.pushed_at,
        })
    }
}

impl ItemSource for GistClient {
    fn list_items(&self, since: Option<DateTime<Utc>>) -> SourceResult<Vec<GistItem>> {
        let started_at = Instant::now();
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        'pages: loop {
            let viewer = self.query_page(after.as_deref())?;
            for node in viewer.gists.nodes {
                // Ordered by pushedAt desc: the first older gist ends the listing.
                if let (Some(since), Some(pushed_at)) = (since, node.pushed_at) {
                    if pushed_at <= since {
                        break 'pages;
                    }
                }
                items.push(self.to_item(&viewer.login, node)?);
            }

            let page_info = viewer.gists.page_info;
            debug!(
                "event=gist_page module=github listed={} has_next_page={}",
                items.len(),
                page_info.has_next_page
            );
            match page_info.end_cursor {
                Some(cursor) if page_info.has_next_page => after = Some(cursor),
                _ => break,
            }
        }

        info!(
            "event=gist_list module=github status=ok count={} incremental={} duration_ms={}",
            items.len(),
            since.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(items)
    }

    fn fetch_raw(&self, content_ref: &str) -> SourceResult<Vec<u8>> {
        let response = self.client.get(content_ref).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: format!("raw gist fetch failed for {content_ref}"),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: GistsVariables<'a>,
}

#[derive(Serialize)]
struct GistsVariables<'a> {
    first: u32,
    after: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ViewerData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: ViewerGists,
}

#[derive(Debug, Deserialize)]
struct ViewerGists {
    login: String,
    gists: GistConnection,
}

#[derive(Debug, Deserialize)]
struct GistConnection {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Vec<GistNode>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct GistNode {
    id: String,
    name: String,
    description: Option<String>,
    #[serde(rename = "pushedAt")]
    pushed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::{GistClient, GistClientOptions, GraphQlResponse};
    use std::time::Duration;

    fn client() -> GistClient {
        GistClient::new(GistClientOptions {
            token: "ghp_test".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            gist_base_url: "https://gist.github.com/".to_string(),
            page_size: 500,
            timeout: Duration::from_secs(5),
        })
        .expect("client should build")
    }

    #[test]
    fn rejects_blank_token() {
        let result = GistClient::new(GistClientOptions {
            token: "  ".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            gist_base_url: "https://gist.github.com".to_string(),
            page_size: 10,
            timeout: Duration::from_secs(5),
        });
        assert!(result.is_err());
    }

    #[test]
    fn clamps_page_size_to_graphql_maximum() {
        assert_eq!(client().page_size, 100);
    }

    #[test]
    fn maps_graphql_node_to_item_urls() {
        let payload = r#"{
            "data": {"viewer": {"login": "octo", "gists": {
                "pageInfo": {"endCursor": "Y3Vyc29y", "hasNextPage": false},
                "nodes": [{"id": "MDQ6R2lzdDE=", "name": "e393d881", "description": null,
                           "pushedAt": "2018-01-15T00:48:23Z"}]
            }}}
        }"#;
        let parsed: GraphQlResponse = serde_json::from_str(payload).unwrap();
        let viewer = parsed.data.unwrap().viewer;
        let node = viewer.gists.nodes.into_iter().next().unwrap();

        let item = client().to_item(&viewer.login, node).unwrap();
        assert_eq!(item.url, "https://gist.github.com/e393d881");
        assert_eq!(item.content_ref, "https://gist.github.com/octo/e393d881/raw");
        assert_eq!(item.description, "");
        assert!(item.pushed_at.is_some());
    }

    #[test]
    fn rejects_unsafe_gist_name() {
        let payload = r#"{"id": "x", "name": "../etc", "description": "d", "pushedAt": null}"#;
        let node = serde_json::from_str(payload).unwrap();
        assert!(client().to_item("octo", node).is_err());
    }
}
