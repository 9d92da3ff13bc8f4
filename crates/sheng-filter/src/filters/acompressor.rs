//! 动态范围压缩滤镜.
//!
//! 对标 FFmpeg 的 `acompressor`: 检测器以一阶起音/释放包络跟踪输入 (或旁链)
//! 电平, 超过阈值的部分按压缩比在对数域缩小, 阈值附近由 Hermite 曲线构成软拐点.
//! 向上模式则把低于阈值的部分向阈值提升.

use serde::{Deserialize, Serialize};
use sheng_codec::frame::AudioFrame;
use sheng_core::float_dsp::{Real, cst};
use sheng_core::{Sample, SampleFormat, ShengError, ShengResult};

use crate::Filter;
use crate::filters::make_frame;

/// 压缩方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressorMode {
    /// 压低超过阈值的部分
    #[default]
    Downward,
    /// 提升低于阈值的部分
    Upward,
}

/// 多声道检测器的联动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// 各声道独立检测
    #[default]
    None,
    /// 取各声道绝对值的平均
    Average,
    /// 取各声道绝对值的最大值
    Maximum,
}

/// 电平检测方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    Peak,
    #[default]
    Rms,
}

/// acompressor 参数, 时间单位为毫秒
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcompressorConfig {
    pub level_in: f64,
    pub mode: CompressorMode,
    pub threshold: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
    pub makeup: f64,
    pub knee: f64,
    pub link: LinkMode,
    pub detection: Detection,
    pub level_sc: f64,
    pub mix: f64,
}

impl Default for AcompressorConfig {
    fn default() -> Self {
        Self {
            level_in: 1.0,
            mode: CompressorMode::Downward,
            threshold: 0.125,
            ratio: 2.0,
            attack: 20.0,
            release: 250.0,
            makeup: 1.0,
            knee: 2.82843,
            link: LinkMode::None,
            detection: Detection::Rms,
            level_sc: 1.0,
            mix: 1.0,
        }
    }
}

impl AcompressorConfig {
    pub fn validate(&self) -> ShengResult<()> {
        let ranges = [
            ("level_in", self.level_in, 0.015625, 64.0),
            ("threshold", self.threshold, 0.000976563, 1.0),
            ("ratio", self.ratio, 1.0, 20.0),
            ("attack", self.attack, 0.01, 2000.0),
            ("release", self.release, 0.01, 9000.0),
            ("makeup", self.makeup, 1.0, 64.0),
            ("knee", self.knee, 1.0, 8.0),
            ("level_sc", self.level_sc, 0.015625, 64.0),
            ("mix", self.mix, 0.0, 1.0),
        ];
        for (name, value, min, max) in ranges {
            if !(min..=max).contains(&value) {
                return Err(ShengError::InvalidArgument(format!(
                    "acompressor: {name}={value} 超出范围 [{min}, {max}]"
                )));
            }
        }
        Ok(())
    }
}

/// 由参数与采样率推出的对数域曲线
#[derive(Debug, Clone, Copy)]
struct Curve {
    thres: f64,
    ratio: f64,
    knee: f64,
    knee_start: f64,
    knee_stop: f64,
    compressed_knee_stop: f64,
    /// 线性域的检测门限, 向下模式为拐点起点, 向上模式为拐点终点
    detect: f64,
    attack_coeff: f64,
    release_coeff: f64,
}

impl Curve {
    fn new(config: &AcompressorConfig, sample_rate: u32) -> Self {
        let sqrt_knee = config.knee.sqrt();
        let rms = config.detection == Detection::Rms;
        let lin_knee_start = config.threshold / sqrt_knee;
        let lin_knee_stop = config.threshold * sqrt_knee;
        let adj_knee_start = lin_knee_start * lin_knee_start;
        let adj_knee_stop = lin_knee_stop * lin_knee_stop;
        let thres = config.threshold.ln();
        let knee_start = adj_knee_start.ln();
        let knee_stop = adj_knee_stop.ln();
        let compress = |x: f64| (x - thres) / config.ratio + thres;
        let detect = match (config.mode, rms) {
            (CompressorMode::Downward, true) => adj_knee_start,
            (CompressorMode::Downward, false) => lin_knee_start,
            (CompressorMode::Upward, true) => adj_knee_stop,
            (CompressorMode::Upward, false) => lin_knee_stop,
        };
        let coeff = |ms: f64| (1.0 / (ms * sample_rate as f64 / 4000.0)).min(1.0);
        Self {
            thres,
            ratio: config.ratio,
            knee: config.knee,
            knee_start,
            knee_stop,
            compressed_knee_stop: compress(knee_stop),
            detect,
            attack_coeff: coeff(config.attack),
            release_coeff: coeff(config.release),
        }
    }

    /// 检测电平对应的线性增益
    fn gain(&self, lin_slope: f64, mode: CompressorMode, rms: bool) -> f64 {
        let slope = if rms {
            lin_slope.ln() * 0.5
        } else {
            lin_slope.ln()
        };
        let delta = 1.0 / self.ratio;
        let mut gain = (slope - self.thres) / self.ratio + self.thres;
        match mode {
            CompressorMode::Downward => {
                if self.knee > 1.0 && slope < self.knee_stop {
                    gain = hermite(
                        slope,
                        self.knee_start,
                        self.knee_stop,
                        self.knee_start,
                        self.compressed_knee_stop,
                        1.0,
                        delta,
                    );
                }
            }
            CompressorMode::Upward => {
                if self.knee > 1.0 && slope > self.knee_start {
                    gain = hermite(
                        slope,
                        self.knee_stop,
                        self.knee_start,
                        self.compressed_knee_stop,
                        self.knee_start,
                        delta,
                        1.0,
                    );
                }
            }
        }
        (gain - slope).exp()
    }

    fn detected(&self, lin_slope: f64, mode: CompressorMode) -> bool {
        match mode {
            CompressorMode::Downward => lin_slope > self.detect,
            CompressorMode::Upward => lin_slope < self.detect,
        }
    }
}

/// 三次 Hermite 插值
fn hermite(x: f64, x0: f64, x1: f64, p0: f64, p1: f64, m0: f64, m1: f64) -> f64 {
    let width = x1 - x0;
    let t = (x - x0) / width;
    let (m0, m1) = (m0 * width, m1 * width);
    let t2 = t * t;
    let t3 = t2 * t;
    let ct0 = p0;
    let ct1 = m0;
    let ct2 = -3.0 * p0 - 2.0 * m0 + 3.0 * p1 - m1;
    let ct3 = 2.0 * p0 + m0 - 2.0 * p1 + m1;
    ct3 * t3 + ct2 * t2 + ct1 * t + ct0
}

/// 检测器输入的绝对值
fn detector_input<T: Real>(
    planes: &[Vec<T>],
    sidechain: Option<&[Vec<T>]>,
    ch: usize,
    i: usize,
) -> f64 {
    let v = match sidechain {
        Some(sc) => sc[ch][i],
        None => planes[ch][i],
    };
    v.to_f64().unwrap_or(0.0).abs()
}

/// 压缩器状态: 每个检测器一个包络
#[derive(Debug)]
struct Compressor {
    config: AcompressorConfig,
    curve: Curve,
    sample_rate: u32,
    lin_slope: Vec<f64>,
}

impl Compressor {
    fn new(config: &AcompressorConfig, sample_rate: u32, channels: usize) -> Self {
        let detectors = match config.link {
            LinkMode::None => channels,
            LinkMode::Average | LinkMode::Maximum => 1,
        };
        Self {
            config: config.clone(),
            curve: Curve::new(config, sample_rate),
            sample_rate,
            lin_slope: vec![0.0; detectors],
        }
    }

    /// 就地压缩各声道, `sidechain` 为空时以输入自身检测
    fn process<T: Real>(&mut self, planes: &mut [Vec<T>], sidechain: Option<&[Vec<T>]>) {
        let c = &self.config;
        let rms = c.detection == Detection::Rms;
        let level_in = c.level_in;
        let wet = c.makeup * c.mix;
        let dry = 1.0 - c.mix;
        let len = planes.first().map_or(0, Vec::len);
        let sc_channels = sidechain.map_or(planes.len(), <[Vec<T>]>::len);

        for i in 0..len {
            let shared = match c.link {
                LinkMode::None => None,
                LinkMode::Maximum => Some(
                    (0..sc_channels)
                        .map(|ch| detector_input(&*planes, sidechain, ch, i) * c.level_sc)
                        .fold(0.0, f64::max),
                ),
                LinkMode::Average => Some(
                    (0..sc_channels)
                        .map(|ch| detector_input(&*planes, sidechain, ch, i) * c.level_sc)
                        .sum::<f64>()
                        / sc_channels.max(1) as f64,
                ),
            };

            for ch in 0..planes.len() {
                let slot = if shared.is_some() { 0 } else { ch };
                let mut abs = match shared {
                    Some(v) => v,
                    None => {
                        let sc_ch = ch.min(sc_channels.saturating_sub(1));
                        detector_input(&*planes, sidechain, sc_ch, i) * c.level_sc
                    }
                };
                if rms {
                    abs *= abs;
                }
                // 共享检测器每个采样只更新一次
                if shared.is_none() || ch == 0 {
                    let slope = &mut self.lin_slope[slot];
                    let coeff = if abs > *slope {
                        self.curve.attack_coeff
                    } else {
                        self.curve.release_coeff
                    };
                    *slope += (abs - *slope) * coeff;
                }
                let slope = self.lin_slope[slot];
                let gain = if slope > 0.0 && self.curve.detected(slope, c.mode) {
                    self.curve.gain(slope, c.mode, rms)
                } else {
                    1.0
                };
                let x = planes[ch][i].to_f64().unwrap_or(0.0) * level_in;
                planes[ch][i] = cst(x * (gain * wet + dry));
            }
        }
    }
}

/// 动态范围压缩滤镜 (f32 / f64 采样)
#[derive(Debug)]
pub struct AcompressorFilter {
    config: AcompressorConfig,
    state: Option<Compressor>,
    output: Option<AudioFrame>,
}

impl AcompressorFilter {
    pub fn new(config: AcompressorConfig) -> ShengResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            output: None,
        })
    }

    /// 以外部旁链信号驱动检测器处理一帧
    pub fn send_with_sidechain(
        &mut self,
        frame: &AudioFrame,
        sidechain: &AudioFrame,
    ) -> ShengResult<()> {
        if sidechain.nb_samples != frame.nb_samples
            || sidechain.sample_rate != frame.sample_rate
            || sidechain.sample_format.to_planar() != frame.sample_format.to_planar()
        {
            return Err(ShengError::InvalidArgument(
                "acompressor: 旁链与输入的采样数、采样率或格式不一致".into(),
            ));
        }
        self.compress(frame, Some(sidechain))
    }

    fn compress(&mut self, frame: &AudioFrame, sidechain: Option<&AudioFrame>) -> ShengResult<()> {
        match frame.sample_format.to_planar() {
            SampleFormat::F32p => self.compress_as::<f32>(frame, sidechain),
            SampleFormat::F64p => self.compress_as::<f64>(frame, sidechain),
            other => Err(ShengError::Unsupported(format!(
                "acompressor 只支持浮点采样: {other}"
            ))),
        }
    }

    fn compress_as<T: Real + Sample>(
        &mut self,
        frame: &AudioFrame,
        sidechain: Option<&AudioFrame>,
    ) -> ShengResult<()> {
        let channels = frame.channels();
        let state = match self.state.take() {
            Some(s) if s.sample_rate == frame.sample_rate => s,
            _ => {
                let s = Compressor::new(&self.config, frame.sample_rate, channels);
                log::debug!(
                    "acompressor 初始化: {channels} 声道, {} Hz, {:?}",
                    frame.sample_rate,
                    s.curve
                );
                s
            }
        };
        let state = self.state.insert(state);
        if state.config.link == LinkMode::None && state.lin_slope.len() != channels {
            state.lin_slope.resize(channels, 0.0);
        }

        let mut planes = frame.planes::<T>()?;
        let sc = sidechain.map(|f| f.planes::<T>()).transpose()?;
        state.process(&mut planes, sc.as_deref());
        self.output = Some(make_frame(
            &planes,
            frame.sample_rate,
            frame.channel_layout,
            frame.pts,
        )?);
        Ok(())
    }
}

impl Filter for AcompressorFilter {
    fn name(&self) -> &str {
        "acompressor"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        self.compress(frame, None)
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        self.output.take().ok_or(ShengError::NeedMoreData)
    }

    fn flush(&mut self) -> ShengResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheng_core::ChannelLayout;

    fn run(filter: &mut AcompressorFilter, planes: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let layout = if planes.len() == 1 {
            ChannelLayout::MONO
        } else {
            ChannelLayout::STEREO
        };
        let frame = AudioFrame::from_planes(planes, 48000, layout).unwrap();
        filter.send_frame(&frame).unwrap();
        filter.receive_frame().unwrap().planes::<f64>().unwrap()
    }

    fn tone(amp: f64, len: usize) -> Vec<f64> {
        (0..len).map(|i| amp * (i as f64 * 0.05).sin()).collect()
    }

    fn peak(v: &[f64]) -> f64 {
        v.iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    #[test]
    fn test_低于阈值原样通过() {
        let mut f = AcompressorFilter::new(AcompressorConfig::default()).unwrap();
        let input = tone(0.01, 4800);
        let out = run(&mut f, &[input.clone()]);
        for (a, b) in out[0].iter().zip(&input) {
            assert!((a - b).abs() < 1e-12, "安静信号不应被改变");
        }
    }

    #[test]
    fn test_响亮信号被压低() {
        let config = AcompressorConfig {
            ratio: 8.0,
            attack: 1.0,
            ..Default::default()
        };
        let mut f = AcompressorFilter::new(config).unwrap();
        let input = tone(0.9, 48000);
        let out = run(&mut f, &[input.clone()]);
        let tail = 24000..48000;
        assert!(
            peak(&out[0][tail.clone()]) < 0.6 * peak(&input[tail]),
            "超过阈值的信号应被明显压低"
        );
    }

    #[test]
    fn test_干湿混合为零时透传() {
        let config = AcompressorConfig {
            mix: 0.0,
            ..Default::default()
        };
        let mut f = AcompressorFilter::new(config).unwrap();
        let input = tone(0.9, 4800);
        let out = run(&mut f, &[input.clone()]);
        assert_eq!(out[0], input, "mix=0 时应输出原始信号");
    }

    #[test]
    fn test_向上模式提升安静信号() {
        let config = AcompressorConfig {
            mode: CompressorMode::Upward,
            threshold: 0.5,
            ratio: 4.0,
            knee: 1.0,
            ..Default::default()
        };
        let mut f = AcompressorFilter::new(config).unwrap();
        let input = tone(0.05, 48000);
        let out = run(&mut f, &[input.clone()]);
        let tail = 24000..48000;
        assert!(
            peak(&out[0][tail.clone()]) > 1.5 * peak(&input[tail]),
            "向上模式应提升低于阈值的信号"
        );
    }

    #[test]
    fn test_联动检测压低安静声道() {
        let loud = tone(0.9, 48000);
        let quiet = tone(0.01, 48000);
        let config = |link| AcompressorConfig {
            ratio: 8.0,
            attack: 1.0,
            link,
            ..Default::default()
        };

        let mut free = AcompressorFilter::new(config(LinkMode::None)).unwrap();
        let out = run(&mut free, &[loud.clone(), quiet.clone()]);
        assert!(
            (peak(&out[1][24000..]) - peak(&quiet[24000..])).abs() < 1e-9,
            "独立检测时安静声道不受影响"
        );

        let mut linked = AcompressorFilter::new(config(LinkMode::Maximum)).unwrap();
        let out = run(&mut linked, &[loud, quiet.clone()]);
        assert!(
            peak(&out[1][24000..]) < 0.6 * peak(&quiet[24000..]),
            "最大值联动时安静声道随响亮声道一起压低"
        );
    }

    #[test]
    fn test_旁链驱动检测() {
        let mut f = AcompressorFilter::new(AcompressorConfig {
            ratio: 8.0,
            attack: 1.0,
            ..Default::default()
        })
        .unwrap();
        let input = tone(0.01, 48000);
        let key = tone(0.9, 48000);
        let frame = AudioFrame::from_planes(&[input.clone()], 48000, ChannelLayout::MONO).unwrap();
        let sc = AudioFrame::from_planes(&[key], 48000, ChannelLayout::MONO).unwrap();
        f.send_with_sidechain(&frame, &sc).unwrap();
        let out = f.receive_frame().unwrap().planes::<f64>().unwrap();
        assert!(
            peak(&out[0][24000..]) < 0.6 * peak(&input[24000..]),
            "响亮的旁链应压低安静的输入"
        );

        let short = AudioFrame::from_planes(&[vec![0.0; 10]], 48000, ChannelLayout::MONO).unwrap();
        assert!(f.send_with_sidechain(&frame, &short).is_err(), "旁链长度不同应报错");
    }

    #[test]
    fn test_软拐点连续() {
        let config = AcompressorConfig::default();
        let curve = Curve::new(&config, 48000);
        // 拐点两端与硬拐点曲线衔接
        let at_stop = curve.gain(curve.knee_stop.exp(), CompressorMode::Downward, false);
        let hard = (curve.compressed_knee_stop - curve.knee_stop).exp();
        assert!((at_stop - hard).abs() < 1e-9, "拐点终点应与压缩曲线重合");
        let at_start = curve.gain(curve.knee_start.exp(), CompressorMode::Downward, false);
        assert!((at_start - 1.0).abs() < 1e-9, "拐点起点增益应为 1");
    }

    #[test]
    fn test_参数校验() {
        for json in [r#"{"ratio": 0.5}"#, r#"{"mix": 1.5}"#, r#"{"knee": 9}"#] {
            let config: AcompressorConfig = serde_json::from_str(json).unwrap();
            assert!(AcompressorFilter::new(config).is_err(), "{json} 应被拒绝");
        }
        let int = AudioFrame::from_planes(&[vec![0i16; 4]], 48000, ChannelLayout::MONO).unwrap();
        let mut f = AcompressorFilter::new(AcompressorConfig::default()).unwrap();
        assert!(f.send_frame(&int).is_err(), "整数采样不支持");
    }
}
