//! Backend selection.
//!
//! `cpu` (default) runs on NdArray, `wgpu` on the GPU. Training wraps the
//! chosen backend in `Autodiff`.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use log::info;

#[cfg(not(feature = "wgpu"))]
pub type AutoBackend = burn::backend::NdArray<f32>;

#[cfg(feature = "wgpu")]
pub type AutoBackend = burn::backend::Wgpu;

/// Backend used by the training loop (gradients enabled).
pub type AutoTrainBackend = Autodiff<AutoBackend>;

pub fn get_device() -> <AutoBackend as Backend>::Device {
    Default::default()
}

pub fn print_backend_info() {
    #[cfg(feature = "wgpu")]
    let name = "wgpu";
    #[cfg(not(feature = "wgpu"))]
    let name = "ndarray (cpu)";

    info!("Backend: {} / device {:?}", name, get_device());
    println!("🖥️  Backend: {} ({:?})", name, get_device());
}
