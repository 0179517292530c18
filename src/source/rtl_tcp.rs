//! Minimal `rtl_tcp` client.
//!
//! An `rtl_tcp` server greets with a 12-byte header (`RTL0`, tuner type, gain
//! stage count, both big-endian `u32`), accepts 5-byte commands (opcode +
//! big-endian `u32` parameter) and then streams interleaved unsigned 8-bit
//! I/Q samples.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::live::{Receiver, Tuning};
use super::AcquisitionError;
use crate::config::{HardwareConfig, MAX_WINDOW_SIZE};

const MAGIC: &[u8; 4] = b"RTL0";
const HEADER_LEN: usize = 12;

/// Opcodes understood by `rtl_tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    SetFrequency = 0x01,
    SetSampleRate = 0x02,
    SetGainMode = 0x03,
    SetFreqCorrection = 0x05,
}

pub fn encode_command(cmd: Command, param: u32) -> [u8; 5] {
    let p = param.to_be_bytes();
    [cmd as u8, p[0], p[1], p[2], p[3]]
}

/// Tuner chip reported in the greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerType {
    Unknown,
    E4000,
    Fc0012,
    Fc0013,
    Fc2580,
    R820t,
    R828d,
}

impl From<u32> for TunerType {
    fn from(v: u32) -> Self {
        match v {
            1 => TunerType::E4000,
            2 => TunerType::Fc0012,
            3 => TunerType::Fc0013,
            4 => TunerType::Fc2580,
            5 => TunerType::R820t,
            6 => TunerType::R828d,
            _ => TunerType::Unknown,
        }
    }
}

impl fmt::Display for TunerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunerType::Unknown => "unknown",
            TunerType::E4000 => "E4000",
            TunerType::Fc0012 => "FC0012",
            TunerType::Fc0013 => "FC0013",
            TunerType::Fc2580 => "FC2580",
            TunerType::R820t => "R820T",
            TunerType::R828d => "R828D",
        };
        f.write_str(name)
    }
}

/// Parsed `rtl_tcp` greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub tuner: TunerType,
    pub gain_count: u32,
}

pub fn parse_header(buf: &[u8; HEADER_LEN]) -> Result<DongleInfo, AcquisitionError> {
    if &buf[..4] != MAGIC {
        return Err(AcquisitionError::BadHeader(format!(
            "magic {:02x?}",
            &buf[..4]
        )));
    }
    let tuner = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let gain_count = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Ok(DongleInfo {
        tuner: TunerType::from(tuner),
        gain_count,
    })
}

/// One complex baseband sample, scaled to [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iq {
    pub i: f32,
    pub q: f32,
}

impl Iq {
    pub fn from_u8(i: u8, q: u8) -> Self {
        Self {
            i: (i as f32 - 127.5) / 127.5,
            q: (q as f32 - 127.5) / 127.5,
        }
    }

    /// |s|^2
    pub fn power(&self) -> f64 {
        let (i, q) = (self.i as f64, self.q as f64);
        i * i + q * q
    }
}

/// Client for a single `rtl_tcp` endpoint. Each acquisition opens a fresh
/// connection and closes it when done.
#[derive(Debug, Clone)]
pub struct RtlTcpReceiver {
    address: String,
    timeout: Duration,
    freq_correction_ppm: i32,
}

impl RtlTcpReceiver {
    pub fn new(address: impl Into<String>, timeout: Duration, freq_correction_ppm: i32) -> Self {
        Self {
            address: address.into(),
            timeout,
            freq_correction_ppm,
        }
    }

    pub fn from_config(cfg: &HardwareConfig) -> Self {
        Self::new(cfg.rtl_tcp_address.clone(), cfg.timeout(), cfg.freq_correction_ppm)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<(TcpStream, DongleInfo), AcquisitionError> {
        let mut stream = timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| AcquisitionError::Timeout("connect"))?
            .map_err(|source| AcquisitionError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let mut header = [0u8; HEADER_LEN];
        timeout(self.timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| AcquisitionError::Timeout("greeting"))??;
        let info = parse_header(&header)?;
        debug!(
            address = %self.address,
            tuner = %info.tuner,
            gains = info.gain_count,
            "rtl_tcp connected"
        );
        Ok((stream, info))
    }

    async fn send(
        &self,
        stream: &mut TcpStream,
        cmd: Command,
        param: u32,
    ) -> Result<(), AcquisitionError> {
        timeout(self.timeout, stream.write_all(&encode_command(cmd, param)))
            .await
            .map_err(|_| AcquisitionError::Timeout("command"))??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Receiver for RtlTcpReceiver {
    async fn probe(&self) -> Result<DongleInfo, AcquisitionError> {
        let (_stream, info) = self.connect().await?;
        Ok(info)
    }

    async fn acquire(&self, tuning: &Tuning) -> Result<Vec<Iq>, AcquisitionError> {
        let read_len = tuning
            .num_samples
            .checked_mul(2)
            .filter(|_| tuning.num_samples <= MAX_WINDOW_SIZE)
            .ok_or_else(|| {
                AcquisitionError::InvalidTuning(format!(
                    "{} samples per read exceeds {}",
                    tuning.num_samples, MAX_WINDOW_SIZE
                ))
            })?;
        let (mut stream, _info) = self.connect().await?;

        self.send(&mut stream, Command::SetSampleRate, tuning.sample_rate_hz)
            .await?;
        self.send(&mut stream, Command::SetFrequency, tuning.center_hz).await?;
        // 0 = automatic gain
        self.send(&mut stream, Command::SetGainMode, 0).await?;
        // Negative ppm travels as its two's complement bit pattern.
        self.send(&mut stream, Command::SetFreqCorrection, self.freq_correction_ppm as u32)
            .await?;

        let mut raw = vec![0u8; read_len];
        timeout(self.timeout, stream.read_exact(&mut raw))
            .await
            .map_err(|_| AcquisitionError::Timeout("sample read"))??;

        Ok(raw
            .chunks_exact(2)
            .map(|pair| Iq::from_u8(pair[0], pair[1]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn greeting(tuner: u32) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&tuner.to_be_bytes());
        buf[8..].copy_from_slice(&29u32.to_be_bytes());
        buf
    }

    #[test]
    fn test_parse_header() {
        let info = parse_header(&greeting(5)).unwrap();
        assert_eq!(info.tuner, TunerType::R820t);
        assert_eq!(info.gain_count, 29);
        assert_eq!(info.tuner.to_string(), "R820T");
    }

    #[test]
    fn test_parse_header_bad_magic() {
        let mut buf = greeting(5);
        buf[0] = b'X';
        assert!(matches!(
            parse_header(&buf),
            Err(AcquisitionError::BadHeader(_))
        ));
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(
            encode_command(Command::SetFrequency, 100_000_000),
            [0x01, 0x05, 0xf5, 0xe1, 0x00]
        );
        assert_eq!(encode_command(Command::SetGainMode, 0), [0x03, 0, 0, 0, 0]);
    }

    #[test]
    fn test_iq_scaling() {
        let s = Iq::from_u8(255, 0);
        assert!((s.i - 1.0).abs() < 1e-6);
        assert!((s.q + 1.0).abs() < 1e-6);
        assert!((s.power() - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_acquire_against_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&greeting(1)).await.unwrap();
            let mut cmds = [0u8; 20];
            sock.read_exact(&mut cmds).await.unwrap();
            sock.write_all(&[255, 0, 128, 128, 0, 255, 127, 127]).await.unwrap();
            cmds
        });

        let rx = RtlTcpReceiver::new(addr.to_string(), Duration::from_secs(2), 60);
        let tuning = Tuning {
            center_hz: 94_000_000,
            sample_rate_hz: 2_400_000,
            num_samples: 4,
        };
        let iq = rx.acquire(&tuning).await.unwrap();
        assert_eq!(iq.len(), 4);
        assert!((iq[0].power() - 2.0).abs() < 1e-6);

        let cmds = server.await.unwrap();
        assert_eq!(&cmds[..5], &encode_command(Command::SetSampleRate, 2_400_000));
        assert_eq!(&cmds[5..10], &encode_command(Command::SetFrequency, 94_000_000));
        assert_eq!(&cmds[15..20], &encode_command(Command::SetFreqCorrection, 60));
    }

    #[tokio::test]
    async fn test_oversized_read_rejected_before_connect() {
        // A live greeting server: the request must fail without touching it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(&greeting(5)).await;
            }
        });

        let rx = RtlTcpReceiver::new(addr.to_string(), Duration::from_secs(1), 0);
        for num_samples in [usize::MAX, MAX_WINDOW_SIZE + 1] {
            let tuning = Tuning {
                center_hz: 94_000_000,
                sample_rate_hz: 2_400_000,
                num_samples,
            };
            assert!(matches!(
                rx.acquire(&tuning).await,
                Err(AcquisitionError::InvalidTuning(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let rx = RtlTcpReceiver::new(addr.to_string(), Duration::from_millis(500), 0);
        assert!(rx.probe().await.is_err());
    }
}
