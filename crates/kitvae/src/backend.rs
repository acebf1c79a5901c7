//! Compile-time backend selection.

pub mod burn_backend_types {
    use burn::backend::Autodiff;
    use cfg_if::cfg_if;

    cfg_if! {
        if #[cfg(feature = "cuda")] {
            use burn::backend::cuda::{Cuda, CudaDevice};

            /// Backend used for inference and evaluation.
            pub type InferenceBackend = Cuda;
            pub type InferenceDevice = CudaDevice;
            /// Backend name for logging purposes.
            pub const NAME: &str = "CUDA (NVIDIA GPU)";
        } else if #[cfg(feature = "wgpu")] {
            use burn::backend::wgpu::{Wgpu, WgpuDevice};

            /// Backend used for inference and evaluation.
            pub type InferenceBackend = Wgpu;
            pub type InferenceDevice = WgpuDevice;
            /// Backend name for logging purposes.
            pub const NAME: &str = "WGPU (GPU)";
        } else {
            use burn::backend::ndarray::{NdArray, NdArrayDevice};

            /// Backend used for inference and evaluation.
            pub type InferenceBackend = NdArray;
            pub type InferenceDevice = NdArrayDevice;
            /// Backend name for logging purposes.
            pub const NAME: &str = "NdArray (CPU)";
        }
    }

    /// Backend used for training.
    pub type TrainBackend = Autodiff<InferenceBackend>;
}
