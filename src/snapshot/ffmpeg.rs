//! ffmpeg/ffprobe capture backend / 基于ffmpeg/ffprobe的采集后端
//!
//! Opening a stream runs `ffprobe` against it; reading a frame runs `ffmpeg`
//! for a single PPM frame on stdout; encoding pipes raw RGB24 through
//! `ffmpeg`'s mjpeg encoder. Every child is killed when its future is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use super::capture::{BackendError, CaptureBackend, Frame, FrameEncoder, VideoCapture};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub probe_timeout_secs: u64,
    pub frame_timeout_secs: u64,
    pub encode_timeout_secs: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            probe_timeout_secs: 10,
            frame_timeout_secs: 15,
            encode_timeout_secs: 10,
        }
    }
}

/// Protocols an input may reach, including nested ones / 输入允许使用的协议（含嵌套协议）
pub const PROTOCOL_WHITELIST: &str = "rtsp,rtsps,rtp,srtp,tcp,udp,tls,http,https,httpproxy,crypto";

/// Input options: protocol whitelist, and TCP interleaving for RTSP sources
/// 输入选项：协议白名单；RTSP源强制使用TCP传输
fn input_args(uri: &str) -> Vec<String> {
    let mut args = vec!["-protocol_whitelist".to_string(), PROTOCOL_WHITELIST.to_string()];
    let rtsp = Url::parse(uri).is_ok_and(|u| matches!(u.scheme(), "rtsp" | "rtsps"));
    if rtsp {
        args.push("-rtsp_transport".to_string());
        args.push("tcp".to_string());
    }
    args
}

pub(crate) fn probe_args(uri: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-v", "error"].iter().map(|s| s.to_string()).collect();
    args.extend(input_args(uri));
    args.extend(
        [
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(uri.to_string());
    args
}

pub(crate) fn frame_args(uri: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(input_args(uri));
    args.push("-i".to_string());
    args.push(uri.to_string());
    args.extend(
        ["-frames:v", "1", "-f", "image2pipe", "-vcodec", "ppm", "-"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

/// Map JPEG quality 1-100 onto mjpeg `-q:v` 31-2 / 将JPEG质量映射到mjpeg的`-q:v`
pub(crate) fn mjpeg_qscale(quality: u8) -> u32 {
    let quality = u32::from(quality.clamp(1, 100));
    2 + (100 - quality) * 29 / 100
}

pub(crate) fn encode_args(width: u32, height: u32, quality: u8) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        format!("{width}x{height}"),
        "-i".to_string(),
        "-".to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        mjpeg_qscale(quality).to_string(),
        "-f".to_string(),
        "image2".to_string(),
        "-vcodec".to_string(),
        "mjpeg".to_string(),
        "-".to_string(),
    ]
}

fn command(program: &str, args: &[String]) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines().last().unwrap_or("").trim().to_string()
}

/// Parse a binary (P6) PPM image with maxval 255 / 解析P6格式PPM图像
pub fn parse_ppm(data: &[u8]) -> Result<Frame, BackendError> {
    let mut pos = 0usize;
    let mut fields = Vec::with_capacity(4);
    while fields.len() < 4 {
        // Skip whitespace and comments between header tokens.
        loop {
            match data.get(pos) {
                Some(b) if b.is_ascii_whitespace() => pos += 1,
                Some(b'#') => {
                    while data.get(pos).is_some_and(|b| *b != b'\n') {
                        pos += 1;
                    }
                }
                Some(_) => break,
                None => return Err(BackendError("truncated PPM header".to_string())),
            }
        }
        let start = pos;
        while data.get(pos).is_some_and(|b| !b.is_ascii_whitespace()) {
            pos += 1;
        }
        fields.push(String::from_utf8_lossy(&data[start..pos]).to_string());
    }
    if fields[0] != "P6" {
        return Err(BackendError(format!("unsupported image format {}", fields[0])));
    }
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| BackendError(format!("invalid PPM header value {s}")))
    };
    let width = number(&fields[1])?;
    let height = number(&fields[2])?;
    if number(&fields[3])? != 255 {
        return Err(BackendError("only 8-bit PPM is supported".to_string()));
    }
    // Exactly one whitespace byte separates the header from the raster.
    pos += 1;
    let too_large = || BackendError(format!("PPM dimensions {width}x{height} are too large"));
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(too_large)?;
    let end = pos.checked_add(expected).ok_or_else(too_large)?;
    let raster = data.get(pos..end).ok_or_else(|| {
        BackendError(format!(
            "PPM raster too short: expected {expected} bytes, got {}",
            data.len().saturating_sub(pos)
        ))
    })?;
    Ok(Frame {
        width,
        height,
        rgb: raster.to_vec(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    config: FfmpegConfig,
}

impl FfmpegBackend {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CaptureBackend for FfmpegBackend {
    async fn open(&self, uri: &str) -> Result<Box<dyn VideoCapture>, BackendError> {
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.probe_timeout_secs),
            command(&self.config.ffprobe_path, &probe_args(uri)).output(),
        )
        .await
        .map_err(|_| BackendError("stream probe timed out".to_string()))?
        .map_err(|e| BackendError(format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(BackendError(stderr_tail(&output.stderr)));
        }
        let probed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if probed.is_empty() {
            return Err(BackendError("no video stream found".to_string()));
        }
        debug!(probed = %probed, "stream probed");
        Ok(Box::new(FfmpegCapture {
            uri: uri.to_string(),
            ffmpeg_path: self.config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(self.config.frame_timeout_secs),
            released: false,
        }))
    }
}

struct FfmpegCapture {
    uri: String,
    ffmpeg_path: String,
    timeout: Duration,
    released: bool,
}

#[async_trait]
impl VideoCapture for FfmpegCapture {
    async fn read_frame(&mut self) -> Result<Option<Frame>, BackendError> {
        if self.released {
            return Err(BackendError("capture already released".to_string()));
        }
        let output = tokio::time::timeout(
            self.timeout,
            command(&self.ffmpeg_path, &frame_args(&self.uri)).output(),
        )
        .await
        .map_err(|_| BackendError("frame read timed out".to_string()))?
        .map_err(|e| BackendError(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(BackendError(stderr_tail(&output.stderr)));
        }
        if output.stdout.is_empty() {
            return Ok(None);
        }
        parse_ppm(&output.stdout).map(Some)
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    config: FfmpegConfig,
}

impl FfmpegEncoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    async fn encode_jpeg(&self, frame: &Frame, quality: u8) -> Result<Vec<u8>, BackendError> {
        let mut cmd = command(
            &self.config.ffmpeg_path,
            &encode_args(frame.width, frame.height, quality),
        );
        cmd.stdin(Stdio::piped());
        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError(format!("failed to run ffmpeg: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError("encoder stdin unavailable".to_string()))?;
        let raster = frame.rgb.clone();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&raster).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.encode_timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| BackendError("encoding timed out".to_string()))?
        .map_err(|e| BackendError(format!("encoder failed: {e}")))?;

        if let Ok(Err(e)) = writer.await {
            return Err(BackendError(format!("failed to feed encoder: {e}")));
        }
        if !output.status.success() {
            return Err(BackendError(stderr_tail(&output.stderr)));
        }
        if !output.stdout.starts_with(&[0xFF, 0xD8]) {
            return Err(BackendError("encoder produced no JPEG data".to_string()));
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ppm() {
        let mut data = b"P6\n# from ffmpeg\n2 1\n255\n".to_vec();
        data.extend_from_slice(&[255, 0, 0, 0, 0, 255]);
        let frame = parse_ppm(&data).unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.rgb, vec![255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn test_parse_ppm_rejects_bad_input() {
        assert!(parse_ppm(b"P5\n1 1\n255\n\0").is_err());
        assert!(parse_ppm(b"P6\n2 2\n255\n\0\0\0").is_err());
        assert!(parse_ppm(b"P6\n1 1\n65535\n\0\0\0\0\0\0").is_err());
        assert!(parse_ppm(b"P6\n1").is_err());
        assert!(parse_ppm(b"").is_err());
    }

    #[test]
    fn test_parse_ppm_oversized_dimensions() {
        let err = parse_ppm(b"P6\n4294967295 4294967295\n255\n\0").unwrap_err();
        assert!(err.0.contains("too large"), "{}", err.0);
        assert!(parse_ppm(b"P6\n4294967295 1\n255\n\0").is_err());
    }

    #[test]
    fn test_rtsp_forces_tcp() {
        let args = frame_args("rtsp://cam/live");
        let pos = args.iter().position(|a| a == "-rtsp_transport").unwrap();
        assert_eq!(args[pos + 1], "tcp");
        assert!(pos < args.iter().position(|a| a == "-i").unwrap());
        assert!(probe_args("RTSP://cam/live").contains(&"-rtsp_transport".to_string()));

        assert!(!frame_args("http://cam/mjpeg").contains(&"-rtsp_transport".to_string()));
        assert_eq!(probe_args("file.mp4").last().unwrap(), "file.mp4");
    }

    #[test]
    fn test_inputs_are_protocol_whitelisted() {
        for args in [probe_args("rtsp://cam/live"), frame_args("http://cam/mjpeg")] {
            let pos = args.iter().position(|a| a == "-protocol_whitelist").unwrap();
            assert_eq!(args[pos + 1], PROTOCOL_WHITELIST);
            assert!(pos < args.iter().position(|a| a == "-i").unwrap());
        }
        for blocked in ["file", "concat", "subfile", "pipe", "data"] {
            assert!(!PROTOCOL_WHITELIST.split(',').any(|p| p == blocked));
        }
    }

    #[test]
    fn test_mjpeg_qscale() {
        assert_eq!(mjpeg_qscale(100), 2);
        assert_eq!(mjpeg_qscale(90), 4);
        assert_eq!(mjpeg_qscale(1), 30);
        assert_eq!(mjpeg_qscale(0), 30);
        let args = encode_args(640, 480, 90);
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "640x480"));
        assert!(args.windows(2).any(|w| w[0] == "-q:v" && w[1] == "4"));
    }
}
