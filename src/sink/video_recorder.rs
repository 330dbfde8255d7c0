use super::SinkError;
use crate::common::ScreenSize;
use crate::config::RecordingConfig;
use image::RgbaImage;
use log::{debug, info, warn};
use std::{
    collections::VecDeque,
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    thread::{self, JoinHandle},
};

/// Encoder error lines kept for `SinkError::Encoder`.
const STDERR_TAIL_LINES: usize = 20;

pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<(), SinkError>;
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// Encodes frames by piping raw RGBA into an `ffmpeg` child process.
pub struct FfmpegVideoSink {
    output_path: PathBuf,
    size: ScreenSize,
    process: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_counter: u64,
}

impl FfmpegVideoSink {
    pub fn open(path: &Path, size: ScreenSize, config: &RecordingConfig) -> Result<Self, SinkError> {
        // ffmpeg only reports an unusable output path once frames flow; check it up front.
        File::create(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let args = encoder_args(path, size, config);
        debug!("Starting ffmpeg: {:?}", args);

        let mut process = Command::new(&config.ffmpeg_binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SinkError::Spawn)?;

        let (Some(stdin), Some(stderr)) = (process.stdin.take(), process.stderr.take()) else {
            let _ = process.kill();
            return Err(SinkError::Spawn(std::io::Error::other(
                "Failed to capture ffmpeg pipes",
            )));
        };
        let stderr = match drain_stderr(stderr) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = process.kill();
                return Err(SinkError::Spawn(e));
            }
        };

        info!(
            "Recording {}x{} @ {} fps ({}, {} bps) to {:?}",
            size.width, size.height, config.fps, config.codec, config.bitrate, path
        );

        Ok(Self {
            output_path: path.to_path_buf(),
            size,
            process,
            stdin: Some(stdin),
            stderr: Some(stderr),
            frame_counter: 0,
        })
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        // Closing stdin tells ffmpeg the stream ended.
        drop(self.stdin.take());
        let status = self.process.wait()?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            return Ok(());
        }
        Err(SinkError::Encoder {
            status: status.to_string(),
            stderr,
        })
    }
}

/// Reads the encoder's stderr until it closes, logging each line and returning the tail.
fn drain_stderr<R: Read + Send + 'static>(pipe: R) -> std::io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                if text.is_empty() {
                    continue;
                }
                warn!("ffmpeg: {}", text);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
            Vec::from(tail).join("\n")
        })
}

pub(crate) fn encoder_args(path: &Path, size: ScreenSize, config: &RecordingConfig) -> Vec<String> {
    vec![
        "-y".to_string(), // Overwrite output file if it exists
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", size.width, size.height),
        "-r".to_string(),
        config.fps.to_string(),
        "-i".to_string(),
        "-".to_string(), // stdin for video frames
        "-c:v".to_string(),
        config.codec.clone(),
        "-b:v".to_string(),
        config.bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

impl VideoSink for FfmpegVideoSink {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<(), SinkError> {
        if frame.dimensions() != self.size.to_tuple() {
            return Err(SinkError::FrameSize {
                width: self.size.width,
                height: self.size.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            SinkError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            ))
        })?;
        stdin.write_all(frame.as_raw())?;
        self.frame_counter += 1;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.finish()?;
        info!(
            "Video {:?} closed after {} frames",
            self.output_path, self.frame_counter
        );
        Ok(())
    }
}

impl Drop for FfmpegVideoSink {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            if let Err(e) = self.finish() {
                warn!("Encoder for {:?} failed on drop: {}", self.output_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_args_use_configured_stream() {
        let config = RecordingConfig::default();
        let args = encoder_args(Path::new("/tmp/out.mp4"), ScreenSize::new(1920, 1080), &config);
        let joined = args.join(" ");

        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 1920x1080 -r 25 -i -"));
        assert!(joined.contains("-c:v mpeg4 -b:v 8000000"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn unwritable_output_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordingConfig {
            ffmpeg_binary: PathBuf::from("definitely-not-ffmpeg"),
            ..RecordingConfig::default()
        };
        let result = FfmpegVideoSink::open(
            &dir.path().join("no-such-dir").join("out.mp4"),
            ScreenSize::new(4, 4),
            &config,
        );
        assert!(matches!(result, Err(SinkError::Open { .. })));
    }

    #[test]
    fn stderr_drain_reads_to_end_and_keeps_the_tail() {
        let mut noise = Vec::new();
        for i in 0..10_000 {
            noise.extend_from_slice(format!("error line {}\n", i).as_bytes());
        }
        noise.extend_from_slice(b"bad bytes \xff\xfe\nlast line");

        let tail = drain_stderr(std::io::Cursor::new(noise))
            .unwrap()
            .join()
            .unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "error line 9982");
        assert_eq!(lines[STDERR_TAIL_LINES - 2], "bad bytes \u{fffd}\u{fffd}");
        assert_eq!(lines[STDERR_TAIL_LINES - 1], "last line");
    }

    /// A stand-in encoder that floods stderr before reading any input.
    #[cfg(unix)]
    fn noisy_encoder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("noisy-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nyes 'encoder complaint' | head -c 262144 >&2\ncat > /dev/null\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn chatty_encoder_does_not_stall_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordingConfig {
            ffmpeg_binary: noisy_encoder(dir.path()),
            ..RecordingConfig::default()
        };
        let size = ScreenSize::new(320, 240);
        let mut sink = FfmpegVideoSink::open(&dir.path().join("out.mp4"), size, &config).unwrap();

        // Each frame is larger than a pipe buffer.
        let frame = RgbaImage::new(size.width, size.height);
        for _ in 0..4 {
            sink.write_frame(&frame).unwrap();
        }

        match Box::new(sink).close() {
            Err(SinkError::Encoder { stderr, .. }) => {
                assert!(stderr.contains("encoder complaint"), "stderr tail: {}", stderr);
            }
            other => panic!("expected encoder error, got {:?}", other),
        }
    }

    #[test]
    fn missing_encoder_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordingConfig {
            ffmpeg_binary: PathBuf::from("definitely-not-ffmpeg"),
            ..RecordingConfig::default()
        };
        let result = FfmpegVideoSink::open(&dir.path().join("out.mp4"), ScreenSize::new(4, 4), &config);
        assert!(matches!(result, Err(SinkError::Spawn(_))));
    }
}
