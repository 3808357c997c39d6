#![allow(clippy::new_without_default)]

use js_sys::Array;
use wasm_bindgen::prelude::*;

use crate::{
    config::RecognizerConfig,
    inference::HttpModelSource,
    session::{Session, Status},
    state::{init_device, Backend},
    surface::{Bounds, Point, PointerEvent},
};

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// Digit recognizer exported as a JavaScript class.
///
/// The page forwards canvas events with client coordinates, paints [`pixels`](Self::pixels)
/// back onto the canvas and renders [`status`](Self::status). Event methods return
/// `true` when the page must call `preventDefault()`.
#[wasm_bindgen]
pub struct DigitRecognizer {
    session: Session<Backend, HttpModelSource>,
    bounds: Bounds,
}

#[wasm_bindgen]
impl DigitRecognizer {
    /// Fails when `model_url` is not a valid http(s) URL.
    #[wasm_bindgen(constructor)]
    pub fn new(model_url: String) -> Result<DigitRecognizer, String> {
        console_error_panic_hook::set_once();

        let config = RecognizerConfig::new(model_url);
        let session =
            Session::from_config(&config, Default::default()).map_err(|err| err.to_string())?;

        Ok(Self {
            session,
            bounds: Bounds::default(),
        })
    }

    pub async fn load(&mut self) -> Result<(), String> {
        init_device().await;

        self.session
            .load()
            .await
            .map_err(|err| err.user_message().to_string())
    }

    /// Offset of the canvas on screen, as given by `getBoundingClientRect()`.
    pub fn set_bounds(&mut self, left: f32, top: f32) {
        self.bounds = Bounds::new(left, top);
    }

    pub fn mouse_down(&mut self, client_x: f32, client_y: f32) -> bool {
        self.dispatch(PointerEvent::MouseDown(Point::new(client_x, client_y)))
    }

    pub fn mouse_move(&mut self, client_x: f32, client_y: f32) -> bool {
        self.dispatch(PointerEvent::MouseMove(Point::new(client_x, client_y)))
    }

    pub fn mouse_up(&mut self) -> bool {
        self.dispatch(PointerEvent::MouseUp)
    }

    pub fn mouse_leave(&mut self) -> bool {
        self.dispatch(PointerEvent::MouseLeave)
    }

    /// Touch coordinates are passed as parallel arrays, in `touches` order.
    pub fn touch_start(&mut self, client_x: &[f32], client_y: &[f32]) -> bool {
        self.dispatch(PointerEvent::TouchStart(touches(client_x, client_y)))
    }

    pub fn touch_move(&mut self, client_x: &[f32], client_y: &[f32]) -> bool {
        self.dispatch(PointerEvent::TouchMove(touches(client_x, client_y)))
    }

    pub fn touch_end(&mut self) -> bool {
        self.dispatch(PointerEvent::TouchEnd)
    }

    pub fn touch_cancel(&mut self) -> bool {
        self.dispatch(PointerEvent::TouchCancel)
    }

    pub fn clear(&mut self) {
        self.session.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.session.surface().is_empty()
    }

    pub fn can_predict(&self) -> bool {
        self.session.can_predict()
    }

    pub fn can_clear(&self) -> bool {
        self.session.can_clear()
    }

    pub fn width(&self) -> u32 {
        self.session.surface().width()
    }

    pub fn height(&self) -> u32 {
        self.session.surface().height()
    }

    /// RGBA pixels for `new ImageData(pixels, width, height)`.
    pub fn pixels(&self) -> Vec<u8> {
        self.session.surface().rgba_pixels()
    }

    /// Returns the predicted digit, or the message to display.
    pub async fn predict(&mut self) -> Result<u8, String> {
        self.session
            .predict()
            .await
            .map_err(|err| err.user_message().to_string())
    }

    /// Class probabilities of the last prediction, indexed by digit.
    pub fn probabilities(&self) -> Array {
        let array = Array::new();

        if let Some(prediction) = self.session.prediction() {
            for value in &prediction.probabilities {
                array.push(&(*value).into());
            }
        }

        array
    }

    pub fn status(&self) -> String {
        match self.session.status() {
            Status::Loading => "Loading the AI model...".to_string(),
            Status::Predicting => "Recognizing...".to_string(),
            Status::Failed(message) => message.to_string(),
            Status::Predicted(label) => format!("AI prediction: {label}"),
            Status::Idle => String::new(),
        }
    }
}

impl DigitRecognizer {
    fn dispatch(&mut self, event: PointerEvent) -> bool {
        self.session
            .handle_event(&event, self.bounds)
            .prevent_default
    }
}

fn touches(client_x: &[f32], client_y: &[f32]) -> Vec<Point> {
    client_x
        .iter()
        .zip(client_y)
        .map(|(x, y)| Point::new(*x, *y))
        .collect()
}
