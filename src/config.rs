use burn::config::Config;

use crate::model::ModelConfig;

/// Narrowest stroke drawn on the surface, in canvas pixels.
pub const MIN_STROKE_WIDTH: f32 = 15.0;

#[derive(Config, Debug)]
pub struct RecognizerConfig {
    /// Where the classifier record is fetched from, once per session.
    pub model_url: String,
    #[config(default = 280)]
    pub canvas_width: u32,
    #[config(default = 280)]
    pub canvas_height: u32,
    /// Stroke width in canvas pixels; derived from the canvas width when unset.
    #[config(default = "None")]
    pub stroke_width: Option<f32>,
    /// Run a throwaway inference right after the model is loaded.
    #[config(default = true)]
    pub warmup: bool,
    #[config(default = "ModelConfig::new()")]
    pub model: ModelConfig,
}

impl RecognizerConfig {
    pub fn effective_stroke_width(&self) -> f32 {
        self.stroke_width
            .unwrap_or_else(|| (self.canvas_width as f32 / 20.0).max(MIN_STROKE_WIDTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_URL: &str = "http://127.0.0.1:8000/model.bin";

    #[test]
    fn stroke_width_scales_with_canvas() {
        let config = RecognizerConfig::new(MODEL_URL.into());
        assert_eq!(config.effective_stroke_width(), 15.0);

        let config = RecognizerConfig::new(MODEL_URL.into()).with_canvas_width(560);
        assert_eq!(config.effective_stroke_width(), 28.0);

        let config = RecognizerConfig::new(MODEL_URL.into()).with_stroke_width(Some(4.0));
        assert_eq!(config.effective_stroke_width(), 4.0);
    }

    #[test]
    fn defaults_to_square_canvas() {
        let config = RecognizerConfig::new(MODEL_URL.into());

        assert_eq!(config.model_url, MODEL_URL);
        assert_eq!((config.canvas_width, config.canvas_height), (280, 280));
        assert!(config.warmup);
        assert_eq!(config.model.num_classes, 10);
    }
}
