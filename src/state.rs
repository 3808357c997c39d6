#[cfg(feature = "wgpu")]
use burn::backend::wgpu::{graphics::AutoGraphicsApi, init_setup_async};

#[cfg(feature = "wgpu")]
pub type Backend = burn::backend::Wgpu<f32, i32>;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type Backend = burn::backend::NdArray<f32>;

pub type Device = <Backend as burn::tensor::backend::Backend>::Device;

/// Prepares the default device of the selected backend.
pub async fn init_device() -> Device {
    let device = Device::default();

    #[cfg(feature = "wgpu")]
    init_setup_async::<AutoGraphicsApi>(&device, Default::default()).await;

    device
}
