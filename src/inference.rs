use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{activation::softmax, backend::Backend},
};

use crate::{
    config::RecognizerConfig,
    error::{InferenceError, LoadError},
    model::{Model, ModelConfig},
    preprocess::InputTensor,
};

/// Where the serialized classifier record comes from.
#[allow(async_fn_in_trait)]
pub trait ModelSource {
    /// Human readable location, used in errors and logs.
    fn location(&self) -> &str;

    /// Fetches the encoded record.
    async fn fetch(&self) -> Result<Vec<u8>, LoadError>;
}

/// Fetches the record over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpModelSource {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpModelSource {
    /// Fails when `url` is not an absolute `http` or `https` URL.
    pub fn new(url: &str) -> Result<Self, LoadError> {
        let invalid = |reason: String| LoadError::InvalidLocation {
            location: url.to_string(),
            reason,
        };

        let parsed = reqwest::Url::parse(url).map_err(|err| invalid(err.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
        }

        Ok(Self {
            url: parsed,
            client: reqwest::Client::new(),
        })
    }
}

impl ModelSource for HttpModelSource {
    fn location(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        let fetch_error = |err: reqwest::Error| LoadError::Fetch {
            location: self.url.to_string(),
            reason: err.to_string(),
        };

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;
        let bytes = response.bytes().await.map_err(fetch_error)?;

        Ok(bytes.to_vec())
    }
}

/// Serves a record that is already in memory, e.g. bundled with `include_bytes!`.
#[derive(Debug, Clone)]
pub struct BytesModelSource {
    location: String,
    bytes: Vec<u8>,
}

impl BytesModelSource {
    pub fn new(location: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            location: location.into(),
            bytes: bytes.into(),
        }
    }
}

impl ModelSource for BytesModelSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        Ok(self.bytes.clone())
    }
}

/// Scored classifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: u8,
    /// Softmax over the classes, indexed by label.
    pub probabilities: Vec<f32>,
}

/// A loaded, warmed up classifier. Read-only once opened.
#[derive(Debug)]
pub struct ModelHandle<B: Backend> {
    model: Model<B>,
    device: B::Device,
    location: String,
}

impl<B: Backend> ModelHandle<B> {
    /// Fetches the record from `source`, loads it into a model built from `config`
    /// and optionally runs one throwaway inference on a zero input.
    pub async fn open<S: ModelSource>(
        source: &S,
        config: &ModelConfig,
        device: &B::Device,
        warmup: bool,
    ) -> Result<Self, LoadError> {
        let location = source.location().to_string();
        let bytes = source.fetch().await?;

        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record = Recorder::<B>::load(&recorder, bytes, device).map_err(|err| {
            LoadError::Malformed {
                location: location.clone(),
                reason: format!("{err:?}"),
            }
        })?;
        let model = config.init::<B>(device).load_record(record);

        let handle = Self {
            model,
            device: device.clone(),
            location,
        };

        if warmup {
            handle.warm_up();
            log::info!("Model loaded and warmed up from {}", handle.location);
        } else {
            log::info!("Model loaded from {}", handle.location);
        }

        Ok(handle)
    }

    fn warm_up(&self) {
        let zeros = InputTensor::<B>::zeros(&self.device);
        let _ = self.model.forward(zeros.into_inner());
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Runs a forward pass and reduces the class probabilities to a label.
    pub async fn predict(&self, input: InputTensor<B>) -> Result<Prediction, InferenceError> {
        let logits = self.model.forward(input.into_inner().to_device(&self.device));
        let output = softmax(logits, 1);

        #[cfg(not(target_family = "wasm"))]
        let data = output.into_data();

        #[cfg(target_family = "wasm")]
        let data = output.into_data_async().await;

        let probabilities = data
            .to_vec::<f32>()
            .map_err(|err| InferenceError::Readback(format!("{err:?}")))?;

        let index = argmax(&probabilities).ok_or(InferenceError::EmptyOutput)?;
        let label = u8::try_from(index).map_err(|_| InferenceError::LabelOutOfRange(index))?;

        log::debug!("Predicted digit {label}");

        Ok(Prediction {
            label,
            probabilities,
        })
    }

    /// Releases the model.
    pub fn close(self) {
        log::debug!("Closing model from {}", self.location);
    }
}

/// Scores `tensor` with the model behind `handle`.
pub async fn predict<B: Backend>(
    handle: Option<&ModelHandle<B>>,
    tensor: Option<InputTensor<B>>,
) -> Result<Prediction, InferenceError> {
    let handle = handle.ok_or(InferenceError::ModelNotLoaded)?;
    let tensor = tensor.ok_or(InferenceError::MissingInput)?;

    handle.predict(tensor).await
}

/// Index of the largest value. The first maximum wins on ties and NaN is never selected.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (index, value) in values.iter().copied().enumerate() {
        match best {
            Some((_, max)) if value <= max || value.is_nan() => {}
            None if value.is_nan() => {}
            _ => best = Some((index, value)),
        }
    }

    best.map(|(index, _)| index)
}

/// Owns the model lifecycle: constructed with its source, loaded once, shared by
/// every prediction afterwards.
pub struct InferenceAdapter<B: Backend, S> {
    source: S,
    config: ModelConfig,
    device: B::Device,
    warmup: bool,
    handle: Option<ModelHandle<B>>,
}

impl<B: Backend> InferenceAdapter<B, HttpModelSource> {
    /// Adapter fetching the model from the configured URL.
    pub fn from_config(config: &RecognizerConfig, device: B::Device) -> Result<Self, LoadError> {
        let source = HttpModelSource::new(&config.model_url)?;

        Ok(Self::new(source, config.model.clone(), device).with_warmup(config.warmup))
    }
}

impl<B: Backend, S: ModelSource> InferenceAdapter<B, S> {
    pub fn new(source: S, config: ModelConfig, device: B::Device) -> Self {
        Self {
            source,
            config,
            device,
            warmup: true,
            handle: None,
        }
    }

    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    /// Loads the model on first call; later calls return the same handle.
    pub async fn load(&mut self) -> Result<&ModelHandle<B>, LoadError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => ModelHandle::open(&self.source, &self.config, &self.device, self.warmup)
                .await
                .inspect_err(|err| log::error!("{err}"))?,
        };

        Ok(self.handle.insert(handle))
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&ModelHandle<B>> {
        self.handle.as_ref()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn predict(&self, tensor: InputTensor<B>) -> Result<Prediction, InferenceError> {
        predict(self.handle.as_ref(), Some(tensor)).await
    }

    /// Drops the loaded model, if any. A later [`load`](Self::load) fetches it again.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }
}

#[cfg(test)]
pub(crate) fn recorded_model(config: &ModelConfig) -> Vec<u8> {
    let model = config.init::<crate::TestBackend>(&Default::default());

    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();

    Recorder::<crate::TestBackend>::record(&recorder, model.into_record(), ())
        .expect("Model should be recorded")
}

/// Source whose every fetch fails as if the network were down.
#[cfg(test)]
pub(crate) struct OfflineSource;

#[cfg(test)]
impl ModelSource for OfflineSource {
    fn location(&self) -> &str {
        "http://offline/model.bin"
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        Err(LoadError::Fetch {
            location: self.location().to_string(),
            reason: "network unreachable".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        preprocess::preprocess,
        surface::{DrawingSurface, Point},
        TestBackend,
    };
    use burn::tensor::Tensor;
    use core::cell::Cell;
    use futures::executor::block_on;

    fn small_config() -> ModelConfig {
        ModelConfig::new().with_hidden_size(32)
    }

    struct CountingSource {
        inner: BytesModelSource,
        fetches: Cell<usize>,
    }

    impl ModelSource for CountingSource {
        fn location(&self) -> &str {
            self.inner.location()
        }

        async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
            self.fetches.set(self.fetches.get() + 1);
            self.inner.fetch().await
        }
    }

    fn loaded_adapter() -> InferenceAdapter<TestBackend, BytesModelSource> {
        let config = small_config();
        let source = BytesModelSource::new("memory", recorded_model(&config));
        let mut adapter = InferenceAdapter::new(source, config, Default::default());
        block_on(adapter.load()).unwrap();
        adapter
    }

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
    }

    #[test]
    fn argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4, 0.0]), Some(1));
        assert_eq!(argmax(&[0.1; 10]), Some(0));
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.3, f32::NAN, 0.5]), Some(3));
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn load_then_predict_vertical_stroke() {
        let adapter = loaded_adapter();
        let mut surface = DrawingSurface::new(280, 280, 15.0);
        surface.start(Point::new(140.0, 40.0));
        surface.continue_stroke(Point::new(140.0, 240.0));
        surface.end();

        let input = preprocess::<TestBackend>(surface.bitmap(), adapter.device()).unwrap();
        let prediction = block_on(adapter.predict(input)).unwrap();

        assert!(prediction.label < 10);
        assert_eq!(prediction.probabilities.len(), 10);
        let total: f32 = prediction.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4, "total {total}");
    }

    #[test]
    fn blank_input_still_yields_a_label() {
        let adapter = loaded_adapter();
        let surface = DrawingSurface::new(280, 280, 15.0);

        let input = preprocess::<TestBackend>(surface.bitmap(), adapter.device()).unwrap();
        let prediction = block_on(adapter.predict(input)).unwrap();

        assert!(prediction.label < 10);
    }

    #[test]
    fn predict_before_load_fails() {
        let config = small_config();
        let source = BytesModelSource::new("memory", recorded_model(&config));
        let adapter = InferenceAdapter::<TestBackend, _>::new(source, config, Default::default());

        let input = InputTensor::zeros(adapter.device());
        let result = block_on(adapter.predict(input));

        assert!(matches!(result, Err(InferenceError::ModelNotLoaded)));
    }

    #[test]
    fn predict_without_tensor_fails() {
        let adapter = loaded_adapter();

        let result = block_on(predict(adapter.handle(), None));

        assert!(matches!(result, Err(InferenceError::MissingInput)));
    }

    #[test]
    fn network_failure_surfaces_load_error() {
        let mut adapter = InferenceAdapter::<TestBackend, _>::new(
            OfflineSource,
            small_config(),
            Default::default(),
        );

        let result = block_on(adapter.load());

        assert!(matches!(result, Err(LoadError::Fetch { .. })));
        assert!(!adapter.is_loaded());
    }

    #[test]
    fn malformed_record_surfaces_load_error() {
        let mut truncated = recorded_model(&small_config());
        truncated.truncate(truncated.len() / 2);

        for bytes in [Vec::new(), b"not a model".to_vec(), truncated] {
            let source = BytesModelSource::new("memory", bytes);
            let mut adapter =
                InferenceAdapter::<TestBackend, _>::new(source, small_config(), Default::default());

            let result = block_on(adapter.load());

            assert!(matches!(result, Err(LoadError::Malformed { .. })));
        }
    }

    #[test]
    fn model_is_fetched_once() {
        let config = small_config();
        let source = CountingSource {
            inner: BytesModelSource::new("memory", recorded_model(&config)),
            fetches: Cell::new(0),
        };
        let mut adapter =
            InferenceAdapter::<TestBackend, _>::new(source, config, Default::default())
                .with_warmup(false);

        block_on(adapter.load()).unwrap();
        block_on(adapter.load()).unwrap();

        assert_eq!(adapter.source().fetches.get(), 1);
    }

    #[test]
    fn close_releases_the_model() {
        let mut adapter = loaded_adapter();

        adapter.close();

        assert!(!adapter.is_loaded());
        let input = InputTensor::zeros(adapter.device());
        assert!(matches!(
            block_on(adapter.predict(input)),
            Err(InferenceError::ModelNotLoaded)
        ));
    }

    #[test]
    fn loaded_model_matches_recorded_weights() {
        let config = small_config();
        let bytes = recorded_model(&config);
        let device = Default::default();
        let first = block_on(ModelHandle::<TestBackend>::open(
            &BytesModelSource::new("memory", bytes.clone()),
            &config,
            &device,
            true,
        ))
        .unwrap();
        let second = block_on(ModelHandle::<TestBackend>::open(
            &BytesModelSource::new("memory", bytes),
            &config,
            &device,
            false,
        ))
        .unwrap();

        let input = || InputTensor::try_from_tensor(Tensor::ones([1, 28, 28, 1], &device)).unwrap();
        let warmed = block_on(first.predict(input())).unwrap();
        let cold = block_on(second.predict(input())).unwrap();

        assert_eq!(warmed, cold);
        assert_eq!(first.location(), "memory");
    }

    #[test]
    fn http_source_rejects_invalid_locations() {
        assert!(matches!(
            HttpModelSource::new("not a url"),
            Err(LoadError::InvalidLocation { .. })
        ));
        assert!(matches!(
            HttpModelSource::new("ftp://example.com/model.bin"),
            Err(LoadError::InvalidLocation { .. })
        ));
        assert!(HttpModelSource::new("https://example.com/model.bin").is_ok());
    }

    #[tokio::test]
    async fn http_source_reports_unreachable_host() {
        // Port 9 (discard) is closed on test machines.
        let source = HttpModelSource::new("http://127.0.0.1:9/model.bin").unwrap();

        let result = source.fetch().await;

        assert!(matches!(result, Err(LoadError::Fetch { .. })));
    }
}
