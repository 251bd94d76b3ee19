use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Runtime;

const SAMPLING_STEPS: u32 = 20;
const OUTPUT_EDGE: u32 = 512;
const GUIDANCE_SCALE: u32 = 7;

#[derive(Debug, Error)]
pub enum DiffusionError {
    #[error("the image service returned no images")]
    NoImages,
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    steps: u32,
    width: u32,
    height: u32,
    cfg_scale: u32,
}

impl<'a> Txt2ImgRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            steps: SAMPLING_STEPS,
            width: OUTPUT_EDGE,
            height: OUTPUT_EDGE,
            cfg_scale: GUIDANCE_SCALE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// A rendered image as the service returned it: a base64-encoded PNG
/// payload. Decoding happens on demand so the payload survives verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    base64: String,
}

impl GeneratedImage {
    pub fn from_base64(payload: impl Into<String>) -> Self {
        Self {
            base64: payload.into(),
        }
    }

    /// Displayable `data:` URI form of the payload.
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    /// Raw PNG bytes, for rendering or saving to disk.
    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.base64.as_bytes())
            .context("image payload is not valid base64")
    }
}

/// Client for an AUTOMATIC1111-style Stable Diffusion API.
#[derive(Debug)]
pub struct DiffusionClient {
    runtime: Arc<Runtime>,
    client: Client,
}

impl DiffusionClient {
    pub fn new(runtime: Arc<Runtime>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("failed to construct HTTP client for image generation")?;
        Ok(Self { runtime, client })
    }

    /// Requests a single 512x512 render of `prompt` with the fixed sampling
    /// parameters. A response without images is an error; the first image
    /// wins when the service returns several.
    pub fn txt2img(
        &self,
        base_url: String,
        prompt: String,
    ) -> tokio::task::JoinHandle<Result<GeneratedImage>> {
        let client = self.client.clone();

        self.runtime.spawn(async move {
            let url = format!("{}/sdapi/v1/txt2img", base_url.trim_end_matches('/'));
            info!("Requesting image from {url}");

            let response = client
                .post(&url)
                .json(&Txt2ImgRequest::new(&prompt))
                .send()
                .await
                .with_context(|| format!("failed to reach the image service at {url}"))?
                .error_for_status()
                .context("image generation request returned error status")?;

            let payload = response
                .json::<Txt2ImgResponse>()
                .await
                .context("failed to parse image generation response JSON")?;

            first_image(payload)
        })
    }
}

fn first_image(payload: Txt2ImgResponse) -> Result<GeneratedImage> {
    payload
        .images
        .into_iter()
        .next()
        .map(GeneratedImage::from_base64)
        .ok_or_else(|| DiffusionError::NoImages.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_the_fixed_sampling_parameters() {
        let value = serde_json::to_value(Txt2ImgRequest::new("a cat")).unwrap();
        assert_eq!(
            value,
            json!({
                "prompt": "a cat",
                "steps": 20,
                "width": 512,
                "height": 512,
                "cfg_scale": 7,
            })
        );
    }

    #[test]
    fn data_uri_wraps_the_payload_verbatim() {
        let image = GeneratedImage::from_base64("abc123");
        assert_eq!(image.data_uri(), "data:image/png;base64,abc123");
    }

    #[test]
    fn png_bytes_round_trips_through_base64() {
        let payload = BASE64.encode(b"not-really-a-png");
        let image = GeneratedImage::from_base64(payload);
        assert_eq!(image.png_bytes().unwrap(), b"not-really-a-png");
    }

    #[test]
    fn png_bytes_rejects_invalid_base64() {
        let image = GeneratedImage::from_base64("%%%");
        assert!(image.png_bytes().is_err());
    }

    #[test]
    fn first_image_takes_the_leading_entry() {
        let payload: Txt2ImgResponse =
            serde_json::from_str(r#"{"images":["abc12345","def45678"]}"#).unwrap();
        let image = first_image(payload).unwrap();
        assert_eq!(image.data_uri(), "data:image/png;base64,abc12345");
    }

    #[test]
    fn an_empty_image_list_is_an_error() {
        let payload: Txt2ImgResponse = serde_json::from_str(r#"{"images":[]}"#).unwrap();
        let err = first_image(payload).unwrap_err();
        assert!(err.downcast_ref::<DiffusionError>().is_some());
    }

    #[test]
    fn a_missing_image_list_is_an_error() {
        let payload: Txt2ImgResponse = serde_json::from_str("{}").unwrap();
        assert!(first_image(payload).is_err());
    }
}
