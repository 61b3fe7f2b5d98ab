//! REST adapter
//!
//! Maps adapter calls onto plain REST conventions under a base URL:
//!
//! | call          | request                          |
//! |---------------|----------------------------------|
//! | `create`      | `POST {base}/{resource}`         |
//! | `reload`      | `GET {base}/{resource}/{id}`     |
//! | `remove`      | `DELETE {base}/{resource}/{id}`  |
//! | `find_record` | `GET {base}/{resource}/{id}` or `GET {base}/{resource}?k=v` |

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::traits::{Adapter, FindQuery};
use crate::config::MapperConfig;
use crate::error::{AdapterError, ConfigError};
use crate::instance::{Instance, DEFAULT_ID_FIELD};

/// Where a model lives on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    pub resource: String,
    pub id_field: String,
}

#[derive(Clone)]
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: Url,
    resources: HashMap<String, ResourceConfig>,
}

impl HttpAdapter {
    /// Adapter with default client settings. Models without an explicit
    /// resource use their lowercased name and the `id` field.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
            resources: HashMap::new(),
        })
    }

    /// Build from the `http` and `models` sections of a config
    pub fn from_config(config: &MapperConfig) -> Result<Self, ConfigError> {
        let http = config
            .http
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("missing 'http' section".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|err| ConfigError::Invalid(format!("http client: {err}")))?;

        let resources = config
            .models
            .iter()
            .map(|(name, model)| {
                let resource = ResourceConfig {
                    resource: model.resource_name(name),
                    id_field: model.id_field.clone(),
                };
                (name.clone(), resource)
            })
            .collect();

        Ok(Self {
            client,
            base_url: Url::parse(&http.base_url)?,
            resources,
        })
    }

    pub fn with_resource(mut self, model: &str, resource: &str, id_field: &str) -> Self {
        self.resources.insert(
            model.to_string(),
            ResourceConfig {
                resource: resource.to_string(),
                id_field: id_field.to_string(),
            },
        );
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resource(&self, model: &str) -> ResourceConfig {
        self.resources
            .get(model)
            .cloned()
            .unwrap_or_else(|| ResourceConfig {
                resource: model.to_lowercase(),
                id_field: DEFAULT_ID_FIELD.to_string(),
            })
    }

    // ---------------------------------------------------------------------------
    // URL building
    // ---------------------------------------------------------------------------

    fn url_with(&self, segments: &[&str]) -> Result<Url, AdapterError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url '{}' cannot be a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn collection_url(&self, model: &str) -> Result<Url, AdapterError> {
        let resource = self.resource(model);
        self.url_with(&[resource.resource.as_str()])
    }

    pub(crate) fn record_url(&self, model: &str, id: &Value) -> Result<Url, AdapterError> {
        let resource = self.resource(model);
        self.url_with(&[resource.resource.as_str(), id_segment(id).as_str()])
    }

    pub(crate) fn query_url(&self, model: &str, query: &FindQuery) -> Result<Url, AdapterError> {
        if let Some(id) = &query.id {
            let mut url = self.record_url(model, id)?;
            append_params(&mut url, query);
            return Ok(url);
        }
        let mut url = self.collection_url(model)?;
        append_params(&mut url, query);
        Ok(url)
    }

    fn instance_id(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        let id_field = self.resource(model).id_field;
        instance
            .value_at(&id_field)
            .filter(|id| !id.is_null())
            .ok_or_else(|| AdapterError::MissingId {
                model: model.to_string(),
                id_field,
            })
    }

    /// Send a request and decode its JSON body. An empty body decodes as null.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, AdapterError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status { status, body });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn id_segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn append_params(url: &mut Url, query: &FindQuery) {
    if query.params.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in &query.params {
        pairs.append_pair(key, &id_segment(value));
    }
}

impl std::fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("base_url", &self.base_url.as_str())
            .field("resources", &self.resources)
            .finish()
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn create(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        let url = self.collection_url(model)?;
        debug!(%url, model, "POST");
        self.send(self.client.post(url).json(&instance.to_value())).await
    }

    async fn reload(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        let url = self.record_url(model, &self.instance_id(model, instance)?)?;
        debug!(%url, model, "GET");
        self.send(self.client.get(url)).await
    }

    async fn remove(&self, model: &str, instance: &Instance) -> Result<(), AdapterError> {
        let url = self.record_url(model, &self.instance_id(model, instance)?)?;
        debug!(%url, model, "DELETE");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn find_record(&self, model: &str, query: &FindQuery) -> Result<Value, AdapterError> {
        let url = self.query_url(model, query)?;
        debug!(%url, model, "GET");
        self.send(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> HttpAdapter {
        HttpAdapter::new("http://localhost:8080/api")
            .unwrap()
            .with_resource("User", "people", "uuid")
    }

    #[test]
    fn test_collection_url() {
        let adapter = adapter();
        assert_eq!(
            adapter.collection_url("User").unwrap().as_str(),
            "http://localhost:8080/api/people"
        );
        assert_eq!(
            adapter.collection_url("Address").unwrap().as_str(),
            "http://localhost:8080/api/address"
        );
    }

    #[test]
    fn test_trailing_slash_base() {
        let adapter = HttpAdapter::new("http://localhost:8080/api/").unwrap();
        assert_eq!(
            adapter.record_url("Team", &json!(7)).unwrap().as_str(),
            "http://localhost:8080/api/team/7"
        );
    }

    #[test]
    fn test_record_url_escapes_string_ids() {
        let adapter = adapter();
        assert_eq!(
            adapter.record_url("User", &json!("a b")).unwrap().as_str(),
            "http://localhost:8080/api/people/a%20b"
        );
    }

    #[test]
    fn test_query_url_with_params() {
        let adapter = adapter();
        let query = FindQuery::any().param("team", "red").param("active", true);
        assert_eq!(
            adapter.query_url("User", &query).unwrap().as_str(),
            "http://localhost:8080/api/people?active=true&team=red"
        );
    }

    #[test]
    fn test_missing_id() {
        let adapter = adapter();
        let instance = Instance::from_value("User", json!({"id": 1}));
        let err = adapter.instance_id("User", &instance).unwrap_err();
        assert!(matches!(err, AdapterError::MissingId { ref id_field, .. } if id_field == "uuid"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(HttpAdapter::new("not a url"), Err(ConfigError::Url(_))));
    }

    #[test]
    fn test_from_config() {
        let config = MapperConfig::from_yaml(
            r#"
http:
  base_url: "https://example.com/v1/"
  timeout_secs: 5
models:
  User:
    resource: people
  Address: {}
"#,
        )
        .unwrap();
        let adapter = HttpAdapter::from_config(&config).unwrap();
        assert_eq!(
            adapter.collection_url("User").unwrap().as_str(),
            "https://example.com/v1/people"
        );

        let bare = MapperConfig::from_yaml("models: {}").unwrap();
        assert!(matches!(HttpAdapter::from_config(&bare), Err(ConfigError::Invalid(_))));
    }
}
