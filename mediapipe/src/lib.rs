//! Safe Rust bridge to MediaPipe calculator graphs.
//!
//! MediaPipe is driven through a thin C shim (`libmediapipe_c`) exposing
//! status objects, image frames, packets and graphs as opaque pointers.
//! This crate wraps those pointers in move-only RAII handles and builds a
//! single-frame inference API on top of them.
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(feature = "native")]
//! # fn run(rgba: &[u8]) -> Result<(), facecap_mediapipe::MediapipeError> {
//! use std::sync::Arc;
//! use facecap_mediapipe::{Environment, FrameBuffer, GraphSolution, ImageFormat, LinkedApi};
//!
//! let env = Environment::init(Arc::new(LinkedApi::new()), "facemesh")?;
//! let mut solution = GraphSolution::face_mesh(env.clone());
//! solution.start()?;
//!
//! let frame = FrameBuffer::new(&env, ImageFormat::Srgba, 640, 480, 640 * 4, rgba)?;
//! if let Some(set) = solution.compute(frame)? {
//!     println!("{} faces", set.face_count());
//! }
//! solution.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Linking
//!
//! The `native` feature links `libmediapipe_c` and enables [`LinkedApi`].
//! Without it only the in-process mock (feature `mock`) is available.
//!
//! # Thread Safety
//!
//! Handles are `Send` but not `Sync`. A [`GraphSolution`] must be driven
//! from one thread at a time.

mod api;
mod env;
mod error;
mod graph;
mod handle;
mod image_frame;
mod landmark;
mod packet;
pub mod resource;
mod solution;
mod status;

#[cfg(feature = "native")]
mod ffi;
#[cfg(feature = "native")]
mod native;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use api::{NativeApi, RawPtr, SidePacket, SideValue};
pub use env::Environment;
#[cfg(any(test, feature = "mock"))]
pub use env::test_lock;
pub use error::MediapipeError;
pub use graph::CalculatorGraph;
pub use handle::{kind, HandleKind, Kind, NativeHandle};
pub use image_frame::{FrameBuffer, ImageFormat};
pub use landmark::{FaceLandmarks, Landmark, LandmarkSet};
pub use packet::Packet;
pub use resource::{DirResourceManager, RegistryResourceManager, ResourceManager};
pub use solution::{GraphSolution, SolutionConfig, SolutionState, FACE_MESH_ASSETS, FACE_MESH_CPU_GRAPH};
pub use status::{Status, StatusCode};

#[cfg(feature = "native")]
pub use native::LinkedApi;
