//! camera.rs
//! Seams to the image-processing layer: where frames come from and how they
//! are turned into marker candidates.

use std::{fmt, fs, path::Path, str::FromStr};

use crate::error::CameraError;
use crate::perception::glyph::Candidate;

const VIDEO_DEVICE_PREFIX: &str = "video";
const REMOTE_FEED_PATH: &str = "mjpegfeed";

/// Where a frame source reads from. Opaque to the detector apart from logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraAddress {
    /// `/dev/video<N>`
    Local { device: u32 },
    /// `http://<host>:<port>/<path>`
    Remote { host: String, port: u16, path: String },
    Simulated { name: String },
}

impl CameraAddress {
    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        CameraAddress::Remote {
            host: host.into(),
            port,
            path: REMOTE_FEED_PATH.to_string(),
        }
    }

    /// Pick the highest-numbered `video*` device in `dev_dir` (the most
    /// recently attached camera).
    pub fn discover_local(dev_dir: &Path) -> Result<Self, CameraError> {
        let mut best: Option<u32> = None;
        for entry in fs::read_dir(dev_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let device = name
                .to_str()
                .and_then(|n| n.strip_prefix(VIDEO_DEVICE_PREFIX))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(device) = device {
                best = Some(best.map_or(device, |b| b.max(device)));
            }
        }
        best.map(|device| CameraAddress::Local { device })
            .ok_or_else(|| CameraError::NoCamera(dev_dir.to_path_buf()))
    }
}

impl fmt::Display for CameraAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraAddress::Local { device } => write!(f, "/dev/video{}", device),
            CameraAddress::Remote { host, port, path } => {
                write!(f, "http://{}:{}/{}", host, port, path)
            }
            CameraAddress::Simulated { name } => write!(f, "sim://{}", name),
        }
    }
}

/// Accepts `/dev/videoN`, `host:port` or a full `scheme://host:port/path` URL.
impl FromStr for CameraAddress {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CameraError::InvalidAddress(s.to_string());
        let s = s.trim();

        if let Some(device) = s.strip_prefix("/dev/video") {
            let device = device.parse().map_err(|_| invalid())?;
            return Ok(CameraAddress::Local { device });
        }
        if let Some(name) = s.strip_prefix("sim://") {
            return Ok(CameraAddress::Simulated {
                name: name.to_string(),
            });
        }

        let rest = match s.split_once("://") {
            Some((_scheme, rest)) => rest,
            None => s,
        };
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path.to_string()),
            None => (rest, REMOTE_FEED_PATH.to_string()),
        };
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(CameraAddress::Remote {
            host: host.to_string(),
            port,
            path,
        })
    }
}

/// The frame read failed; the camera is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost(pub String);

pub trait FrameSource {
    type Frame;

    fn address(&self) -> CameraAddress;

    fn next_frame(&mut self) -> Result<Self::Frame, ConnectionLost>;
}

/// Turns a frame into marker candidates (quad corners plus sampled bitmap).
pub trait QuadExtractor<F> {
    fn candidates(&self, frame: &F) -> Vec<Candidate>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs::File, process};

    #[test]
    fn remote_address_uses_feed_path() {
        let address = CameraAddress::remote("192.168.0.17", 8080);
        assert_eq!(address.to_string(), "http://192.168.0.17:8080/mjpegfeed");
    }

    #[test]
    fn parses_supported_forms() {
        assert_eq!(
            "/dev/video2".parse::<CameraAddress>().unwrap(),
            CameraAddress::Local { device: 2 }
        );
        assert_eq!(
            "10.0.0.5:4747".parse::<CameraAddress>().unwrap(),
            CameraAddress::remote("10.0.0.5", 4747)
        );
        assert_eq!(
            "http://cam.local:81/video".parse::<CameraAddress>().unwrap(),
            CameraAddress::Remote {
                host: "cam.local".into(),
                port: 81,
                path: "video".into()
            }
        );
        assert!("no-port-here".parse::<CameraAddress>().is_err());
        assert!(":80".parse::<CameraAddress>().is_err());
        assert!("/dev/videoX".parse::<CameraAddress>().is_err());
    }

    #[test]
    fn discovers_highest_device() {
        let dir = env::temp_dir().join(format!("glyph_arm_cam_{}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["video0", "video10", "video2", "videoX", "audio3"] {
            File::create(dir.join(name)).unwrap();
        }
        let found = CameraAddress::discover_local(&dir);
        fs::remove_dir_all(&dir).ok();
        assert_eq!(found.unwrap(), CameraAddress::Local { device: 10 });
    }

    #[test]
    fn empty_dir_has_no_camera() {
        let dir = env::temp_dir().join(format!("glyph_arm_nocam_{}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        let found = CameraAddress::discover_local(&dir);
        fs::remove_dir_all(&dir).ok();
        assert!(matches!(found, Err(CameraError::NoCamera(_))));
    }
}
