use burn::tensor::backend::Backend;

use crate::{
    config::RecognizerConfig,
    error::{Error, InferenceError},
    inference::{HttpModelSource, InferenceAdapter, ModelSource, Prediction},
    preprocess::preprocess,
    surface::{Bounds, DrawingSurface, EventResponse, PointerEvent},
};

/// What the host should currently display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status<'a> {
    Loading,
    Predicting,
    Failed(&'a str),
    Predicted(u8),
    Idle,
}

/// One drawing surface and one classifier, plus the state the host UI renders.
///
/// Every failure is kept as a displayable message and none of them is fatal:
/// the user recovers by reloading, redrawing or predicting again.
pub struct Session<B: Backend, S> {
    surface: DrawingSurface,
    adapter: InferenceAdapter<B, S>,
    is_loading: bool,
    is_predicting: bool,
    prediction: Option<Prediction>,
    error: Option<&'static str>,
}

impl<B: Backend> Session<B, HttpModelSource> {
    pub fn from_config(config: &RecognizerConfig, device: B::Device) -> Result<Self, Error> {
        let surface = DrawingSurface::from_config(config)?;
        let adapter = InferenceAdapter::from_config(config, device)?;

        Ok(Self::new(surface, adapter))
    }
}

impl<B: Backend, S: ModelSource> Session<B, S> {
    pub fn new(surface: DrawingSurface, adapter: InferenceAdapter<B, S>) -> Self {
        Self {
            surface,
            adapter,
            is_loading: false,
            is_predicting: false,
            prediction: None,
            error: None,
        }
    }

    /// Loads the classifier. Called once at startup.
    pub async fn load(&mut self) -> Result<(), Error> {
        self.error = None;
        self.is_loading = true;

        let result = self.adapter.load().await.map(|_| ());
        self.is_loading = false;

        result.or_else(|err| self.fail(err.into()))
    }

    /// Classifies what is currently drawn.
    pub async fn predict(&mut self) -> Result<u8, Error> {
        if !self.adapter.is_loaded() {
            return self.fail(InferenceError::ModelNotLoaded.into());
        }
        if self.surface.is_empty() {
            return self.fail(Error::EmptyInput);
        }

        self.is_predicting = true;
        self.error = None;
        self.prediction = None;

        let result = self.run_prediction().await;
        self.is_predicting = false;

        match result {
            Ok(prediction) => {
                let label = prediction.label;
                self.prediction = Some(prediction);
                Ok(label)
            }
            Err(err) => self.fail(err),
        }
    }

    async fn run_prediction(&self) -> Result<Prediction, Error> {
        let input = preprocess::<B>(self.surface.bitmap(), self.adapter.device())?;

        Ok(self.adapter.predict(input).await?)
    }

    fn fail<T>(&mut self, err: Error) -> Result<T, Error> {
        log::error!("{err}");
        self.error = Some(err.user_message());
        Err(err)
    }

    /// Blanks the surface and forgets the last result.
    pub fn clear(&mut self) {
        self.surface.clear();
        self.prediction = None;
        self.error = None;
    }

    pub fn handle_event(&mut self, event: &PointerEvent, bounds: Bounds) -> EventResponse {
        self.surface.handle(event, bounds)
    }

    pub fn can_predict(&self) -> bool {
        self.adapter.is_loaded() && !self.is_loading && !self.is_predicting
    }

    pub fn can_clear(&self) -> bool {
        !self.is_predicting
    }

    pub fn status(&self) -> Status<'_> {
        if self.is_loading {
            Status::Loading
        } else if self.is_predicting {
            Status::Predicting
        } else if let Some(message) = self.error {
            Status::Failed(message)
        } else if let Some(prediction) = &self.prediction {
            Status::Predicted(prediction.label)
        } else {
            Status::Idle
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error
    }

    pub fn surface(&self) -> &DrawingSurface {
        &self.surface
    }

}
