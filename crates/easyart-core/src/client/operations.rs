//! Typed worker operations (image generation, local backend control)

use super::WorkerClient;
use crate::error::{WorkerError, WorkerResult};
use crate::protocol::{
    GenerateParams, RequestParams, StartLocalParams, SwitchModelParams, methods,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Acknowledgement from a local backend operation
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    /// Whatever the worker put in `result`; usually a status object or null
    pub payload: Value,
}

impl WorkerClient {
    /// Generate images and return their paths or URLs
    #[instrument(skip(self, params, cancel), fields(model = %params.model, n = params.count))]
    pub async fn generate(
        &self,
        params: GenerateParams,
        cancel: &CancellationToken,
    ) -> WorkerResult<Vec<String>> {
        let result = self
            .call(methods::IMAGES_GENERATE, RequestParams::Generate(params), cancel)
            .await?;
        collect_image_refs(result)
    }

    /// Start the local Stable Diffusion backend
    #[instrument(skip(self, cancel))]
    pub async fn start_local_server(
        &self,
        model_path: Option<&str>,
        cancel: &CancellationToken,
    ) -> WorkerResult<Ack> {
        let params = RequestParams::StartLocal(StartLocalParams {
            model_path: model_path.map(str::to_string),
        });
        let payload = self.call(methods::LOCAL_SD_START, params, cancel).await?;
        Ok(Ack { payload })
    }

    #[instrument(skip(self, cancel))]
    pub async fn shutdown_local_server(&self, cancel: &CancellationToken) -> WorkerResult<Ack> {
        let payload = self
            .call(methods::LOCAL_SD_SHUTDOWN, RequestParams::empty(), cancel)
            .await?;
        Ok(Ack { payload })
    }

    /// Switch the model loaded by the local backend.
    ///
    /// `timeout_secs` is passed to the worker as advice only; to bound the
    /// wait on this side, cancel `cancel`.
    #[instrument(skip(self, cancel))]
    pub async fn switch_local_model(
        &self,
        model_name: &str,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> WorkerResult<Ack> {
        let params = RequestParams::SwitchModel(SwitchModelParams {
            model_name: model_name.to_string(),
            timeout: timeout_secs,
        });
        let payload = self
            .call(methods::LOCAL_SD_SWITCH_MODEL, params, cancel)
            .await?;
        Ok(Ack { payload })
    }

    /// Call a method without a typed wrapper. `null` params are sent as `{}`;
    /// any other non-object value fails with `InvalidParams` before anything
    /// is sent.
    #[instrument(skip(self, params, cancel))]
    pub async fn call_raw(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> WorkerResult<Value> {
        let params = RequestParams::raw(params)?;
        self.call(method, params, cancel).await
    }
}

fn collect_image_refs(result: Value) -> WorkerResult<Vec<String>> {
    match result {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect()),
        other => Err(WorkerError::unexpected_result(
            methods::IMAGES_GENERATE,
            format!("expected an array of image references, got {}", other),
        )),
    }
}
