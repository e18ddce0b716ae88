//! Dataset loading for the worker: fetch, gunzip, decode.

use crate::config::{STOPS_URL, TIMETABLE_URL};
use crate::engine::network::Network;
use crate::engine::{EngineSource, TransitEngine};
use crate::error::PlannerError;
use flate2::read::GzDecoder;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use log::info;
use std::io::Read;
use std::rc::Rc;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Response, WorkerGlobalScope};

fn fetch_error(url: &str, reason: JsValue) -> PlannerError {
    PlannerError::Fetch {
        url: url.to_string(),
        reason: reason
            .as_string()
            .unwrap_or_else(|| format!("{reason:?}")),
    }
}

/// Download `url` from inside a worker and return the body bytes.
pub async fn fetch_bytes(url: &str) -> Result<Vec<u8>, PlannerError> {
    let scope: WorkerGlobalScope = js_sys::global().unchecked_into();
    let response = JsFuture::from(scope.fetch_with_str(url))
        .await
        .map_err(|e| fetch_error(url, e))?;
    let response: Response = response.unchecked_into();
    if !response.ok() {
        return Err(PlannerError::Fetch {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    let body = response.array_buffer().map_err(|e| fetch_error(url, e))?;
    let buffer = JsFuture::from(body).await.map_err(|e| fetch_error(url, e))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, PlannerError> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| PlannerError::Decode(format!("gzip: {e}")))?;
    Ok(out)
}

/// Loads the compressed timetable and stops datasets over HTTP.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    pub timetable_url: String,
    pub stops_url: String,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        DatasetLoader {
            timetable_url: TIMETABLE_URL.to_string(),
            stops_url: STOPS_URL.to_string(),
        }
    }
}

impl EngineSource for DatasetLoader {
    fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn TransitEngine>, PlannerError>> {
        let loader = self.clone();
        async move {
            info!(
                "Loading datasets {} and {}",
                loader.timetable_url, loader.stops_url
            );
            let (timetable, stops) = future::try_join(
                fetch_bytes(&loader.timetable_url),
                fetch_bytes(&loader.stops_url),
            )
            .await?;
            let network = Network::decode(&gunzip(&timetable)?, &gunzip(&stops)?)?;
            info!("Engine ready with {} stops", network.stop_count());
            Ok(Rc::new(network) as Rc<dyn TransitEngine>)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn gunzip_restores_payload() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"timetable bytes").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(gunzip(&compressed).unwrap(), b"timetable bytes");
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        assert!(matches!(
            gunzip(b"not gzip"),
            Err(PlannerError::Decode(_))
        ));
    }
}
