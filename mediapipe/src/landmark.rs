//! Face landmark results.
//!
//! The graph emits `std::vector<mediapipe::NormalizedLandmarkList>`; the
//! shim serializes each list to protobuf bytes, decoded here with `prost`.

use prost::Message;
use serde::Serialize;

use crate::error::MediapipeError;

/// `mediapipe.NormalizedLandmark` (landmark.proto).
#[derive(Clone, PartialEq, Message)]
pub struct NormalizedLandmarkProto {
    #[prost(float, optional, tag = "1")]
    pub x: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub y: Option<f32>,
    #[prost(float, optional, tag = "3")]
    pub z: Option<f32>,
    #[prost(float, optional, tag = "4")]
    pub visibility: Option<f32>,
    #[prost(float, optional, tag = "5")]
    pub presence: Option<f32>,
}

/// `mediapipe.NormalizedLandmarkList` (landmark.proto).
#[derive(Clone, PartialEq, Message)]
pub struct NormalizedLandmarkListProto {
    #[prost(message, repeated, tag = "1")]
    pub landmark: Vec<NormalizedLandmarkProto>,
}

/// One point in normalized image coordinates.
///
/// `x` and `y` are relative to the image width and height; `z` is depth on
/// roughly the same scale as `x` and is not bounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
            presence: None,
        }
    }
}

impl From<&NormalizedLandmarkProto> for Landmark {
    fn from(p: &NormalizedLandmarkProto) -> Self {
        Self {
            x: p.x.unwrap_or_default(),
            y: p.y.unwrap_or_default(),
            z: p.z.unwrap_or_default(),
            visibility: p.visibility,
            presence: p.presence,
        }
    }
}

impl From<&Landmark> for NormalizedLandmarkProto {
    fn from(l: &Landmark) -> Self {
        Self {
            x: Some(l.x),
            y: Some(l.y),
            z: Some(l.z),
            visibility: l.visibility,
            presence: l.presence,
        }
    }
}

/// Landmarks of a single detected face, in model order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct FaceLandmarks(pub Vec<Landmark>);

impl FaceLandmarks {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.0.iter()
    }

    /// Decodes one serialized `NormalizedLandmarkList`.
    pub fn decode(bytes: &[u8]) -> Result<Self, MediapipeError> {
        let list = NormalizedLandmarkListProto::decode(bytes)?;
        Ok(Self(list.landmark.iter().map(Landmark::from).collect()))
    }

    /// Serializes back into a `NormalizedLandmarkList`.
    pub fn encode(&self) -> Vec<u8> {
        NormalizedLandmarkListProto {
            landmark: self.0.iter().map(NormalizedLandmarkProto::from).collect(),
        }
        .encode_to_vec()
    }
}

/// Per-frame result: every detected face, in graph output order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LandmarkSet {
    pub faces: Vec<FaceLandmarks>,
}

impl LandmarkSet {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Decodes a vector of serialized landmark lists.
    pub fn decode_all<B: AsRef<[u8]>>(items: &[B]) -> Result<Self, MediapipeError> {
        let faces = items
            .iter()
            .map(|b| FaceLandmarks::decode(b.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { faces })
    }
}
