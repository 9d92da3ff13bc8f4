//! ICS 边信息: 窗序列、分组、频带类型与声道元素.

use sheng_core::{ShengError, ShengResult, WindowShape};

use super::ltp::LtpInfo;
use super::tns::TnsData;

/// 每个声道元素最多的频带槽位 (8 组 × 16 带)
pub const MAX_BANDS: usize = 128;

/// 长窗频谱系数个数
pub const FRAME_LEN: usize = 1024;

/// 短窗频谱系数个数
pub const SHORT_LEN: usize = 128;

/// 44.1k/48k 长窗 SFB 边界 (49 个 band)
pub const SWB_OFFSET_1024_48000: [usize; 50] = [
    0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 40, 48, 56, 64, 72, 80, 88, 96, 108, 120, 132, 144, 160,
    176, 196, 216, 240, 264, 292, 320, 352, 384, 416, 448, 480, 512, 544, 576, 608, 640, 672, 704,
    736, 768, 800, 832, 864, 896, 928, 1024,
];

/// 44.1k/48k 短窗 SFB 边界 (14 个 band)
pub const SWB_OFFSET_128_48000: [usize; 15] =
    [0, 4, 8, 12, 16, 20, 28, 36, 44, 56, 68, 80, 96, 112, 128];

/// 窗序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowSequence {
    /// 单长窗
    #[default]
    OnlyLong,
    /// 长转短过渡窗
    LongStart,
    /// 八短窗
    EightShort,
    /// 短转长过渡窗
    LongStop,
}

impl WindowSequence {
    /// 由比特流中的 2 位取值构造
    pub fn from_bits(v: u32) -> ShengResult<Self> {
        match v {
            0 => Ok(Self::OnlyLong),
            1 => Ok(Self::LongStart),
            2 => Ok(Self::EightShort),
            3 => Ok(Self::LongStop),
            _ => Err(ShengError::InvalidData(format!("AAC 窗序列非法: {v}"))),
        }
    }
}

/// 频带类型 (即 section 码本)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandType {
    /// 全零频带
    #[default]
    Zero,
    /// 普通频谱码本 1..=11
    Spectral(u8),
    /// 感知噪声替代 (码本 13)
    Noise,
    /// 反相强度立体声 (码本 14)
    Intensity2,
    /// 同相强度立体声 (码本 15)
    Intensity,
}

impl BandType {
    /// 由码本号构造, 12 为保留值
    pub fn from_codebook(cb: u8) -> ShengResult<Self> {
        match cb {
            0 => Ok(Self::Zero),
            1..=11 => Ok(Self::Spectral(cb)),
            13 => Ok(Self::Noise),
            14 => Ok(Self::Intensity2),
            15 => Ok(Self::Intensity),
            _ => Err(ShengError::InvalidData(format!("AAC 码本非法: {cb}"))),
        }
    }

    /// 码本号
    pub fn codebook(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::Spectral(cb) => cb,
            Self::Noise => 13,
            Self::Intensity2 => 14,
            Self::Intensity => 15,
        }
    }

    /// 是否为强度立体声频带
    pub fn is_intensity(self) -> bool {
        matches!(self, Self::Intensity | Self::Intensity2)
    }
}

/// 单声道流 (ICS) 的窗与分组信息
#[derive(Debug, Clone)]
pub struct IcsInfo {
    pub window_sequence: WindowSequence,
    /// 当前帧窗形状
    pub window_shape: WindowShape,
    /// 上一帧窗形状
    pub prev_window_shape: WindowShape,
    /// 实际传输的频带数
    pub max_sfb: usize,
    /// 当前窗类型下的频带总数
    pub num_swb: usize,
    pub num_windows: usize,
    pub num_window_groups: usize,
    /// 每组包含的窗数
    pub group_len: [usize; 8],
    /// 频带边界, 长度为 `num_swb + 1`
    pub swb_offset: Vec<usize>,
    pub tns_max_bands: usize,
}

impl IcsInfo {
    /// 44.1k/48k 长窗信息
    pub fn long(window_sequence: WindowSequence, max_sfb: usize) -> ShengResult<Self> {
        if window_sequence == WindowSequence::EightShort {
            return Err(ShengError::InvalidArgument("长窗信息不能使用八短窗序列".into()));
        }
        let info = Self {
            window_sequence,
            window_shape: WindowShape::Sine,
            prev_window_shape: WindowShape::Sine,
            max_sfb,
            num_swb: SWB_OFFSET_1024_48000.len() - 1,
            num_windows: 1,
            num_window_groups: 1,
            group_len: [1, 0, 0, 0, 0, 0, 0, 0],
            swb_offset: SWB_OFFSET_1024_48000.to_vec(),
            tns_max_bands: 40,
        };
        info.validate()?;
        Ok(info)
    }

    /// 44.1k/48k 八短窗信息, `group_len` 为各组窗数
    pub fn eight_short(max_sfb: usize, group_len: &[usize]) -> ShengResult<Self> {
        if group_len.is_empty() || group_len.len() > 8 {
            return Err(ShengError::InvalidArgument(format!(
                "短窗分组数非法: {}",
                group_len.len()
            )));
        }
        let mut groups = [0usize; 8];
        groups[..group_len.len()].copy_from_slice(group_len);
        let info = Self {
            window_sequence: WindowSequence::EightShort,
            window_shape: WindowShape::Sine,
            prev_window_shape: WindowShape::Sine,
            max_sfb,
            num_swb: SWB_OFFSET_128_48000.len() - 1,
            num_windows: 8,
            num_window_groups: group_len.len(),
            group_len: groups,
            swb_offset: SWB_OFFSET_128_48000.to_vec(),
            tns_max_bands: 14,
        };
        info.validate()?;
        Ok(info)
    }

    /// 设置窗形状
    pub fn with_shapes(mut self, current: WindowShape, previous: WindowShape) -> Self {
        self.window_shape = current;
        self.prev_window_shape = previous;
        self
    }

    /// 是否为八短窗
    pub fn is_eight_short(&self) -> bool {
        self.window_sequence == WindowSequence::EightShort
    }

    /// 检查分组与边界表的一致性
    pub fn validate(&self) -> ShengResult<()> {
        if self.max_sfb > self.num_swb || self.swb_offset.len() < self.num_swb + 1 {
            return Err(ShengError::InvalidData(format!(
                "AAC max_sfb={} 超出频带数 {}",
                self.max_sfb, self.num_swb
            )));
        }
        if self.swb_offset.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ShengError::InvalidData("AAC 频带边界必须严格递增".into()));
        }
        let limit = if self.is_eight_short() { SHORT_LEN } else { FRAME_LEN };
        if self.swb_offset[self.num_swb] > limit {
            return Err(ShengError::InvalidData(format!(
                "AAC 频带边界越界: {} > {limit}",
                self.swb_offset[self.num_swb]
            )));
        }
        let windows: usize = self.group_len[..self.num_window_groups].iter().sum();
        if windows != self.num_windows || self.num_window_groups * self.max_sfb > MAX_BANDS {
            return Err(ShengError::InvalidData(format!(
                "AAC 窗分组非法: {} 组共 {windows} 个窗, 期望 {}",
                self.num_window_groups, self.num_windows
            )));
        }
        Ok(())
    }
}

/// 计算每个频带所在游程的结束频带 (组内索引, 不含).
///
/// 输出按 `g * max_sfb + i` 排列, 与频带类型数组一致.
pub fn compute_run_ends(ics: &IcsInfo, band_type: &[BandType], run_end: &mut [usize]) {
    let max_sfb = ics.max_sfb;
    for g in 0..ics.num_window_groups {
        let base = g * max_sfb;
        let mut i = 0;
        while i < max_sfb {
            let bt = band_type[base + i];
            let mut end = i + 1;
            while end < max_sfb && band_type[base + end] == bt {
                end += 1;
            }
            run_end[base + i..base + end].fill(end);
            i = end;
        }
    }
}

/// 单声道元素 (SCE) 的频域数据
#[derive(Debug, Clone)]
pub struct SingleChannelElement<T> {
    pub ics: IcsInfo,
    pub band_type: Vec<BandType>,
    pub band_type_run_end: Vec<usize>,
    /// 比特流中的尺度因子偏移
    pub sfo: Vec<i32>,
    /// 反量化后的尺度因子
    pub sf: Vec<T>,
    /// 频谱系数 (长窗 1024, 八短窗 8×128)
    pub coeffs: Vec<T>,
    pub tns: TnsData,
    pub ltp: LtpInfo,
}

impl<T: Copy + Default> SingleChannelElement<T> {
    /// 创建全零元素
    pub fn new(ics: IcsInfo) -> Self {
        Self {
            ics,
            band_type: vec![BandType::Zero; MAX_BANDS],
            band_type_run_end: vec![0; MAX_BANDS],
            sfo: vec![0; MAX_BANDS],
            sf: vec![T::default(); MAX_BANDS],
            coeffs: vec![T::default(); FRAME_LEN],
            tns: TnsData::default(),
            ltp: LtpInfo::default(),
        }
    }

    /// 写入频带类型并重新计算游程表
    pub fn set_band_types(&mut self, types: &[BandType]) -> ShengResult<()> {
        let n = self.ics.num_window_groups * self.ics.max_sfb;
        if types.len() != n {
            return Err(ShengError::InvalidArgument(format!(
                "频带类型个数 {} 与分组不符, 期望 {n}",
                types.len()
            )));
        }
        self.band_type[..n].copy_from_slice(types);
        compute_run_ends(&self.ics, &self.band_type, &mut self.band_type_run_end);
        Ok(())
    }
}

/// 声道对元素 (CPE)
#[derive(Debug, Clone)]
pub struct ChannelPair<T> {
    pub ch: [SingleChannelElement<T>; 2],
    /// 每个频带的 M/S 标志
    pub ms_mask: Vec<bool>,
    /// 是否传输了 M/S 信息
    pub ms_present: bool,
}

impl<T: Copy + Default> ChannelPair<T> {
    /// 以共同窗信息创建
    pub fn new(ics: IcsInfo) -> Self {
        Self {
            ch: [
                SingleChannelElement::new(ics.clone()),
                SingleChannelElement::new(ics),
            ],
            ms_mask: vec![false; MAX_BANDS],
            ms_present: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_游程结束表() {
        let ics = IcsInfo::eight_short(4, &[3, 5]).unwrap();
        let types = [
            BandType::Zero,
            BandType::Zero,
            BandType::Spectral(3),
            BandType::Noise,
            BandType::Intensity,
            BandType::Intensity,
            BandType::Intensity,
            BandType::Intensity2,
        ];
        let mut run_end = [0usize; 8];
        compute_run_ends(&ics, &types, &mut run_end);
        assert_eq!(run_end, [2, 2, 3, 4, 3, 3, 3, 4]);
    }

    #[test]
    fn test_码本转换() {
        assert_eq!(BandType::from_codebook(15).unwrap(), BandType::Intensity);
        assert_eq!(BandType::from_codebook(7).unwrap().codebook(), 7);
        assert!(BandType::from_codebook(12).is_err());
        assert!(BandType::Intensity2.is_intensity());
    }

    #[test]
    fn test_分组校验() {
        assert!(IcsInfo::eight_short(14, &[4, 4]).is_ok());
        assert!(IcsInfo::eight_short(15, &[8]).is_err(), "max_sfb 超出应报错");
        assert!(IcsInfo::eight_short(4, &[3, 3]).is_err(), "窗数不足 8 应报错");
        assert!(IcsInfo::long(WindowSequence::EightShort, 10).is_err());
        assert_eq!(IcsInfo::long(WindowSequence::LongStop, 49).unwrap().num_swb, 49);
    }
}
