use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageOutputFormat};
use psyche::{
    BoundingBox, DetectedFace, FaceDetector, FaceLandmarks, FaceRecognizer, Frame, PersonDetector,
};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Client for the vision sidecar running the detection and recognition models.
///
/// Every endpoint takes the frame as a base64 JPEG:
/// - `POST /faces` returns the detected faces with their landmarks
/// - `POST /identify` matches boxes against the face database
/// - `POST /enroll` adds a face sample for a user
/// - `POST /person` reports whether a person is visible
#[derive(Clone)]
pub struct HttpVision {
    base: Url,
    client: Client,
}

type Point = [f32; 2];

#[derive(Deserialize)]
struct WireLandmarks {
    left_eye: Point,
    right_eye: Point,
    left_eye_tragion: Point,
    right_eye_tragion: Point,
    nose_tip: Point,
    mouth: Point,
}

#[derive(Deserialize)]
struct WireFace {
    /// `[x_min, y_min, x_max, y_max]`
    bbox: [f32; 4],
    landmarks: WireLandmarks,
}

#[derive(Deserialize)]
struct Faces {
    faces: Vec<WireFace>,
}

#[derive(Deserialize)]
struct Names {
    names: Vec<Option<String>>,
}

#[derive(Deserialize)]
struct Presence {
    present: bool,
}

#[derive(Serialize)]
struct Image {
    image: String,
}

#[derive(Serialize)]
struct Identify {
    image: String,
    boxes: Vec<[f32; 4]>,
}

#[derive(Serialize)]
struct Enroll<'a> {
    username: &'a str,
    image: String,
    #[serde(rename = "box")]
    face: [f32; 4],
}

fn corners(b: &BoundingBox) -> [f32; 4] {
    [b.x_min, b.y_min, b.x_max, b.y_max]
}

fn point(p: Point) -> (f32, f32) {
    (p[0], p[1])
}

impl From<WireFace> for DetectedFace {
    fn from(f: WireFace) -> Self {
        let [x_min, y_min, x_max, y_max] = f.bbox;
        let l = f.landmarks;
        DetectedFace {
            bbox: BoundingBox {
                x_min,
                y_min,
                x_max,
                y_max,
            },
            landmarks: FaceLandmarks {
                left_eye: point(l.left_eye),
                right_eye: point(l.right_eye),
                left_eye_tragion: point(l.left_eye_tragion),
                right_eye_tragion: point(l.right_eye_tragion),
                nose_tip: point(l.nose_tip),
                mouth: point(l.mouth),
            },
        }
    }
}

/// Encode `frame` as a base64 JPEG.
pub fn encode_frame(frame: &Frame) -> Result<String> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(frame.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(85))
        .context("encoding frame")?;
    Ok(general_purpose::STANDARD.encode(buf))
}

impl HttpVision {
    /// Create a client for the sidecar at `base` (e.g. `http://localhost:8001`).
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid vision url {base}"))?;
        Ok(Self {
            base,
            client: Client::new(),
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = self.base.join(path)?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl FaceDetector for HttpVision {
    async fn detect_faces(&self, frame: &Frame) -> Result<Vec<DetectedFace>> {
        let body = Image {
            image: encode_frame(frame)?,
        };
        let found: Faces = self.post("faces", &body).await?;
        debug!(faces = found.faces.len(), "faces detected");
        Ok(found.faces.into_iter().map(DetectedFace::from).collect())
    }
}

#[async_trait]
impl FaceRecognizer for HttpVision {
    async fn identify(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Option<String>>> {
        let body = Identify {
            image: encode_frame(frame)?,
            boxes: faces.iter().map(corners).collect(),
        };
        let matched: Names = self.post("identify", &body).await?;
        ensure!(
            matched.names.len() == faces.len(),
            "recognizer returned {} names for {} faces",
            matched.names.len(),
            faces.len()
        );
        Ok(matched.names)
    }

    async fn enroll(&self, username: &str, frame: &Frame, face: &BoundingBox) -> Result<()> {
        let body = Enroll {
            username,
            image: encode_frame(frame)?,
            face: corners(face),
        };
        let _: serde_json::Value = self.post("enroll", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl PersonDetector for HttpVision {
    async fn person_present(&self, frame: &Frame) -> Result<bool> {
        let body = Image {
            image: encode_frame(frame)?,
        };
        let seen: Presence = self.post("person", &body).await?;
        Ok(seen.present)
    }
}
