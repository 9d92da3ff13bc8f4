//! # sheng-filter
//!
//! Sheng 流式音频滤镜库.
//!
//! 本 crate 对标 FFmpeg 的 libavfilter 中的几个频域 / 递归滤镜,
//! 以线性滤镜链 (FilterGraph) 的形式组织, 每个滤镜按块处理 [`AudioFrame`].
//!
//! ## 支持的滤镜
//!
//! - **afir**: 分段卷积 FIR (多脉冲响应切换, 交叉淡化)
//! - **aiir**: IIR 滤波 (直接型 / 级联双二阶 / 并联双二阶 / 格型梯形)
//! - **surround**: 立体声到多声道的频域上混
//! - **afftfilt**: 按频点回调的 STFT 滤镜
//! - **aemphasis**: 唱片 / CD / FM 预加重与去加重
//! - **acompressor**: 动态范围压缩 (软拐点, 可接旁链)
//! - **amix**: 多路输入按权重混音
//!
//! ## 使用示例
//!
//! ```rust
//! use sheng_filter::{FilterGraph, create_filter};
//!
//! let mut graph = FilterGraph::new();
//! graph.add_filter(create_filter("aemphasis", r#"{"type": "cd"}"#).unwrap());
//! assert_eq!(graph.filter_names(), vec!["aemphasis"]);
//! ```

pub mod filters;
pub mod stft;

use serde::de::DeserializeOwned;
use sheng_codec::frame::AudioFrame;
use sheng_core::{ShengError, ShengResult};

/// 滤镜 trait
///
/// 所有音频滤镜都实现此 trait.
/// 滤镜接收输入帧, 处理后输出零个或多个帧.
pub trait Filter: Send {
    /// 获取滤镜名称
    fn name(&self) -> &str;

    /// 送入一帧数据
    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()>;

    /// 取出一帧处理后的数据, 无可用输出时返回 `NeedMoreData`
    fn receive_frame(&mut self) -> ShengResult<AudioFrame>;

    /// 刷新滤镜 (处理剩余缓存数据)
    fn flush(&mut self) -> ShengResult<()>;
}

/// 滤镜图
///
/// 由多个滤镜组成的线性处理链, 数据依次流经每个滤镜.
/// 带缓冲的滤镜一次送入可能产出多帧, 也可能暂不产出.
pub struct FilterGraph {
    /// 滤镜链中的滤镜列表
    filters: Vec<Box<dyn Filter>>,
}

impl FilterGraph {
    /// 创建空的滤镜图
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// 添加滤镜到图中
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// 获取滤镜数量
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// 将帧送入滤镜链, 返回链末端产出的全部帧.
    ///
    /// 如果滤镜链为空, 则直接返回输入帧 (透传).
    pub fn process_frame(&mut self, frame: &AudioFrame) -> ShengResult<Vec<AudioFrame>> {
        Self::run_chain(&mut self.filters, vec![frame.clone()])
    }

    /// 刷新所有滤镜, 获取剩余缓存帧.
    ///
    /// 每个滤镜刷新产出的帧会继续流经其后的滤镜.
    pub fn flush_all(&mut self) -> ShengResult<Vec<AudioFrame>> {
        let mut remaining = Vec::new();
        for idx in 0..self.filters.len() {
            let (head, tail) = self.filters.split_at_mut(idx + 1);
            let filter = &mut head[idx];
            filter.flush()?;
            let drained = drain(filter.as_mut())?;
            remaining.extend(Self::run_chain(tail, drained)?);
        }
        Ok(remaining)
    }

    /// 获取滤镜名称列表 (调试用)
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    fn run_chain(
        filters: &mut [Box<dyn Filter>],
        mut frames: Vec<AudioFrame>,
    ) -> ShengResult<Vec<AudioFrame>> {
        for filter in filters {
            let mut produced = Vec::new();
            for frame in &frames {
                filter.send_frame(frame)?;
                produced.extend(drain(filter.as_mut())?);
            }
            frames = produced;
        }
        Ok(frames)
    }
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// 取出滤镜当前所有可用输出
fn drain(filter: &mut dyn Filter) -> ShengResult<Vec<AudioFrame>> {
    let mut out = Vec::new();
    loop {
        match filter.receive_frame() {
            Ok(frame) => out.push(frame),
            Err(ShengError::NeedMoreData) | Err(ShengError::Eof) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// 解析 JSON 滤镜参数, 空字符串得到默认配置
pub fn parse_config<T: DeserializeOwned + Default>(json: &str) -> ShengResult<T> {
    if json.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(json)
        .map_err(|e| ShengError::InvalidArgument(format!("滤镜参数解析失败: {e}")))
}

/// 按名称创建滤镜, 参数为 JSON 字符串
pub fn create_filter(name: &str, json: &str) -> ShengResult<Box<dyn Filter>> {
    let filter: Box<dyn Filter> = match name {
        "afir" => Box::new(AfirFilter::new(parse_config(json)?)?),
        "aiir" => Box::new(AiirFilter::new(parse_config(json)?)?),
        "surround" => Box::new(SurroundFilter::new(parse_config(json)?)?),
        "afftfilt" => Box::new(AfftfiltFilter::new(parse_config(json)?)?),
        "aemphasis" => Box::new(AemphasisFilter::new(parse_config(json)?)),
        "acompressor" => Box::new(AcompressorFilter::new(parse_config(json)?)?),
        "amix" => Box::new(AmixFilter::new(parse_config(json)?)?),
        _ => return Err(ShengError::FilterNotFound(name.to_string())),
    };
    log::debug!("创建滤镜: {name}");
    Ok(filter)
}

// 便捷重导出
pub use filters::acompressor::{
    AcompressorConfig, AcompressorFilter, CompressorMode, Detection, LinkMode,
};
pub use filters::aemphasis::{AemphasisConfig, AemphasisFilter, EmphasisMode, EmphasisType};
pub use filters::afftfilt::{AfftfiltConfig, AfftfiltFilter, BinContext, SpectralFn};
pub use filters::afir::{AfirConfig, AfirFilter, IrPrecision};
pub use filters::aiir::{AiirConfig, AiirFilter, CoeffFormat, Precision, ProcessMode};
pub use filters::amix::{AmixConfig, AmixFilter, MixDuration};
pub use filters::surround::{LfeMode, SurroundConfig, SurroundFilter};

#[cfg(test)]
mod tests {
    use super::*;
    use sheng_core::ChannelLayout;

    fn make_f64_frame(samples: &[f64]) -> AudioFrame {
        AudioFrame::from_planes(&[samples.to_vec()], 44100, ChannelLayout::MONO).unwrap()
    }

    fn extract_f64(frames: &[AudioFrame]) -> Vec<f64> {
        frames
            .iter()
            .flat_map(|f| f.planes::<f64>().unwrap().remove(0))
            .collect()
    }

    #[test]
    fn test_滤镜图_空链透传() {
        let mut graph = FilterGraph::new();
        let input = make_f64_frame(&[0.5, -0.5]);
        let output = graph.process_frame(&input).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(extract_f64(&output), vec![0.5, -0.5]);
    }

    #[test]
    fn test_滤镜图_链式处理() {
        let mut graph = FilterGraph::new();
        graph.add_filter(create_filter("aemphasis", r#"{"mode": "production"}"#).unwrap());
        graph.add_filter(create_filter("aemphasis", r#"{"mode": "reproduction"}"#).unwrap());
        let input: Vec<f64> = (0..256).map(|i| (i as f64 * 0.05).sin() * 0.5).collect();
        let output = graph.process_frame(&make_f64_frame(&input)).unwrap();
        let samples = extract_f64(&output);
        for (a, b) in samples.iter().zip(&input) {
            assert!((a - b).abs() < 1e-9, "加重与去加重级联应还原输入");
        }
    }

    #[test]
    fn test_滤镜图_名称列表() {
        let mut graph = FilterGraph::new();
        graph.add_filter(create_filter("aemphasis", "").unwrap());
        graph.add_filter(create_filter("aiir", "").unwrap());
        assert_eq!(graph.filter_names(), vec!["aemphasis", "aiir"]);
        assert_eq!(graph.filter_count(), 2);
    }

    #[test]
    fn test_滤镜图_刷新() {
        let mut graph = FilterGraph::new();
        graph.add_filter(create_filter("aemphasis", "").unwrap());
        let remaining = graph.flush_all().unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_滤镜图_刷新帧继续流经下游() {
        let mut graph = FilterGraph::new();
        graph.add_filter(create_filter("afftfilt", r#"{"win_size": 64}"#).unwrap());
        graph.add_filter(create_filter("aemphasis", r#"{"level_out": 2.0, "type": "cd"}"#).unwrap());
        let input = make_f64_frame(&[0.0; 40]);
        let mut total = extract_f64(&graph.process_frame(&input).unwrap()).len();
        total += extract_f64(&graph.flush_all().unwrap()).len();
        assert_eq!(total, 40, "刷新后输出总长应等于输入");
    }

    #[test]
    fn test_滤镜图_混音与压缩() {
        let mut graph = FilterGraph::new();
        graph.add_filter(
            create_filter("amix", r#"{"inputs": 1, "weights": [0.5], "normalize": false}"#)
                .unwrap(),
        );
        graph.add_filter(create_filter("acompressor", r#"{"threshold": 1.0}"#).unwrap());
        assert_eq!(graph.filter_names(), vec!["amix", "acompressor"]);
        let output = graph.process_frame(&make_f64_frame(&[0.2, -0.4])).unwrap();
        assert_eq!(extract_f64(&output), vec![0.1, -0.2], "单路混音按权重缩放");
        assert!(graph.flush_all().unwrap().is_empty());
        assert!(create_filter("amix", r#"{"inputs": 0}"#).is_err(), "无效路数");
    }

    #[test]
    fn test_未知滤镜() {
        let err = create_filter("reverb", "").err().unwrap();
        assert!(matches!(err, ShengError::FilterNotFound(ref n) if n == "reverb"));
    }

    #[test]
    fn test_参数解析错误() {
        let err = parse_config::<AemphasisConfig>("{not json").unwrap_err();
        assert!(matches!(err, ShengError::InvalidArgument(_)));
        let cfg: AemphasisConfig = parse_config("").unwrap();
        assert_eq!(cfg.level_in, 1.0);
    }
}
