use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;
use shared::api::{
    delete_result_path, ANALYZE_PATH, ANALYZE_REALTIME_PATH, FRAME_FILE_NAME, IMAGE_FIELD,
    LOGIN_PATH, SAVE_RESULT_PATH,
};
use shared::{ActionResponse, AnalysisResponse, ResultId, ServerConfig};
use std::time::Duration;

/// Calls the capture loop and the pages make against the analysis service.
#[async_trait]
pub trait EmotionApi: Send + Sync {
    /// Single-shot upload. Returns the body verbatim so it can be forwarded
    /// to [`EmotionApi::save_result`] unchanged.
    async fn analyze_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value>;

    async fn analyze_frame(&self, jpeg: Vec<u8>) -> Result<AnalysisResponse>;

    async fn save_result(&self, analysis: &Value) -> Result<ActionResponse>;

    async fn delete_result(&self, id: ResultId) -> Result<ActionResponse>;

    /// Fetches a server-relative or absolute URL, e.g. `result_image_url`.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .with_context(|| format!("Invalid server URL '{}'", config.base_url))?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Opens a session; every analysis route requires one.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let login_url = self.url(LOGIN_PATH)?;
        let response = self
            .client
            .post(login_url.clone())
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .context("Login request failed")?;

        // The server redirects away from the login page on success and
        // re-renders it on bad credentials.
        if !response.status().is_success() || response.url().path() == login_url.path() {
            bail!("Login rejected for user '{}'", username);
        }

        info!("Logged in as {}", username);
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        let full = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&full).with_context(|| format!("Invalid URL '{}'", full))
    }

    async fn post_image(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<Value> {
        let mime = image::ImageFormat::from_path(file_name)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(self.url(path)?)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        debug!("POST {} -> {}", path, response.status());

        response
            .json::<Value>()
            .await
            .with_context(|| format!("POST {} returned a non-JSON body", path))
    }

    async fn post_action(&self, path: &str, body: Option<&Value>) -> Result<ActionResponse> {
        let mut request = self.client.post(self.url(path)?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        debug!("POST {} -> {}", path, response.status());

        response
            .json::<ActionResponse>()
            .await
            .with_context(|| format!("POST {} returned a non-JSON body", path))
    }
}

#[async_trait]
impl EmotionApi for HttpApi {
    async fn analyze_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value> {
        self.post_image(ANALYZE_PATH, file_name, bytes).await
    }

    async fn analyze_frame(&self, jpeg: Vec<u8>) -> Result<AnalysisResponse> {
        let body = self
            .post_image(ANALYZE_REALTIME_PATH, FRAME_FILE_NAME, jpeg)
            .await?;
        serde_json::from_value(body).context("Unexpected analysis response shape")
    }

    async fn save_result(&self, analysis: &Value) -> Result<ActionResponse> {
        self.post_action(SAVE_RESULT_PATH, Some(analysis)).await
    }

    async fn delete_result(&self, id: ResultId) -> Result<ActionResponse> {
        self.post_action(&delete_result_path(id), None).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(url)?)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} was rejected", url))?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
