//! 音频帧 (AudioFrame).
//!
//! 对标 FFmpeg 的 `AVFrame`, 表示一段原始 PCM 数据.

use sheng_core::{ChannelLayout, Sample, SampleFormat, ShengError, ShengResult};

/// 未设置时间戳
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 音频帧
///
/// 平面格式: data 中每个 Vec 对应一个声道.
/// 交错格式: data 中只有一个 Vec, 所有声道交替排列.
/// 采样按小端字节序存储.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 音频采样数据 (平面格式: 每声道一个 Vec; 交错格式: 单个 Vec)
    pub data: Vec<Vec<u8>>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 显示时间戳 (以采样为单位)
    pub pts: i64,
    /// 帧时长 (以采样为单位)
    pub duration: i64,
}

impl AudioFrame {
    /// 创建空的音频帧
    pub fn new(
        nb_samples: u32,
        sample_rate: u32,
        sample_format: SampleFormat,
        channel_layout: ChannelLayout,
    ) -> Self {
        let plane_count = if sample_format.is_planar() {
            channel_layout.channels as usize
        } else {
            1
        };
        Self {
            data: vec![Vec::new(); plane_count],
            nb_samples,
            sample_rate,
            sample_format,
            channel_layout,
            pts: NOPTS_VALUE,
            duration: nb_samples as i64,
        }
    }

    /// 由各声道采样构造平面格式帧
    pub fn from_planes<S: Sample, P: AsRef<[S]>>(
        planes: &[P],
        sample_rate: u32,
        channel_layout: ChannelLayout,
    ) -> ShengResult<Self> {
        if planes.len() != channel_layout.channels as usize {
            return Err(ShengError::InvalidArgument(format!(
                "声道数不匹配: 数据 {} 个声道, 布局 {}",
                planes.len(),
                channel_layout
            )));
        }
        let nb_samples = planes.first().map_or(0, |p| p.as_ref().len());
        if planes.iter().any(|p| p.as_ref().len() != nb_samples) {
            return Err(ShengError::InvalidArgument("各声道采样数不一致".into()));
        }
        let bps = S::PLANAR_FORMAT.bytes_per_sample();
        let data = planes
            .iter()
            .map(|plane| {
                let plane = plane.as_ref();
                let mut bytes = Vec::with_capacity(plane.len() * bps);
                for &s in plane {
                    s.write_le(&mut bytes);
                }
                bytes
            })
            .collect();
        Ok(Self {
            data,
            nb_samples: nb_samples as u32,
            sample_rate,
            sample_format: S::PLANAR_FORMAT,
            channel_layout,
            pts: NOPTS_VALUE,
            duration: nb_samples as i64,
        })
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        self.channel_layout.channels as usize
    }

    /// 按声道取出采样, 交错格式会被解交错.
    ///
    /// `S` 必须与帧的采样格式一致.
    pub fn planes<S: Sample>(&self) -> ShengResult<Vec<Vec<S>>> {
        if self.sample_format.to_planar() != S::PLANAR_FORMAT {
            return Err(ShengError::Unsupported(format!(
                "采样格式不匹配: 帧为 {}, 期望 {}",
                self.sample_format,
                S::PLANAR_FORMAT
            )));
        }
        let bps = self.sample_format.bytes_per_sample();
        let channels = self.channels();
        let nb = self.nb_samples as usize;

        if self.sample_format.is_planar() {
            if self.data.len() < channels {
                return Err(ShengError::InvalidData(format!(
                    "平面数据不足: {} 个平面, {} 个声道",
                    self.data.len(),
                    channels
                )));
            }
            self.data[..channels]
                .iter()
                .map(|plane| {
                    if plane.len() < nb * bps {
                        return Err(ShengError::InvalidData("平面数据长度不足".into()));
                    }
                    Ok(plane[..nb * bps].chunks_exact(bps).map(S::read_le).collect())
                })
                .collect()
        } else {
            let plane = self
                .data
                .first()
                .ok_or_else(|| ShengError::InvalidData("交错帧缺少数据".into()))?;
            if plane.len() < nb * channels * bps {
                return Err(ShengError::InvalidData("交错数据长度不足".into()));
            }
            let mut out = vec![Vec::with_capacity(nb); channels];
            for (i, chunk) in plane[..nb * channels * bps].chunks_exact(bps).enumerate() {
                out[i % channels].push(S::read_le(chunk));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_平面帧往返() {
        let planes = vec![vec![0.5f32, -0.25], vec![1.0f32, 2.0]];
        let frame = AudioFrame::from_planes(&planes, 48000, ChannelLayout::STEREO).unwrap();
        assert_eq!(frame.sample_format, SampleFormat::F32p);
        assert_eq!(frame.nb_samples, 2);
        assert_eq!(frame.planes::<f32>().unwrap(), planes);
        assert!(frame.planes::<f64>().is_err(), "格式不符应报错");
    }

    #[test]
    fn test_交错帧解交错() {
        let mut frame = AudioFrame::new(2, 44100, SampleFormat::S16, ChannelLayout::STEREO);
        let mut bytes = Vec::new();
        for v in [1i16, -1, 2, -2] {
            v.write_le(&mut bytes);
        }
        frame.data[0] = bytes;
        let planes = frame.planes::<i16>().unwrap();
        assert_eq!(planes, vec![vec![1, 2], vec![-1, -2]]);
    }

    #[test]
    fn test_声道数不符() {
        let planes = vec![vec![0.0f64; 4]];
        assert!(AudioFrame::from_planes(&planes, 8000, ChannelLayout::STEREO).is_err());
    }

    #[test]
    fn test_借用切片构造帧() {
        let left = [0.5f64, 0.25, 0.125];
        let right = vec![1.0f64; 5];
        let frame =
            AudioFrame::from_planes(&[&left[..], &right[..3]], 8000, ChannelLayout::STEREO).unwrap();
        assert_eq!(frame.nb_samples, 3);
        assert_eq!(frame.planes::<f64>().unwrap()[0], left.to_vec());
        assert!(
            AudioFrame::from_planes(&[&left[..], &right[..]], 8000, ChannelLayout::STEREO).is_err(),
            "各声道长度不一致应报错"
        );
    }
}
