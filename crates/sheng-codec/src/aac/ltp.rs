//! 长时预测 (LTP).
//!
//! 每声道保留 3 × 1024 点的时域历史: 上上帧输出、上一帧输出、
//! 以及当前帧加窗后的重叠尾部. 预测只用于长窗.

use sheng_core::tx::Mdct;
use sheng_core::{Real, ShengError, ShengResult};

/// LTP 历史长度
pub const LTP_STATE_LEN: usize = 3 * 1024;

/// 参与预测的最大频带数
pub const MAX_LTP_LONG_SFB: usize = 40;

/// 8 个量化预测系数
pub const LTP_COEF: [f64; 8] = [
    0.570829, 0.696616, 0.813004, 0.911304, 0.984900, 1.067894, 1.194601, 1.369533,
];

/// 每帧的 LTP 边信息
#[derive(Debug, Clone)]
pub struct LtpInfo {
    pub present: bool,
    /// 预测延迟 (采样)
    pub lag: usize,
    pub coef: f64,
    /// 每个频带是否叠加预测值
    pub used: [bool; MAX_LTP_LONG_SFB],
}

impl Default for LtpInfo {
    fn default() -> Self {
        Self {
            present: false,
            lag: 0,
            coef: 0.0,
            used: [false; MAX_LTP_LONG_SFB],
        }
    }
}

impl LtpInfo {
    /// 由比特流字段构造: 11 位延迟, 3 位系数索引
    pub fn from_indices(lag: usize, coef_idx: usize, used: &[bool]) -> ShengResult<Self> {
        let coef = *LTP_COEF.get(coef_idx).ok_or_else(|| {
            ShengError::InvalidData(format!("AAC LTP 系数索引越界: {coef_idx}"))
        })?;
        if lag > 2048 {
            return Err(ShengError::InvalidData(format!("AAC LTP 延迟越界: {lag}")));
        }
        let mut info = Self {
            present: true,
            lag,
            coef,
            ..Default::default()
        };
        let n = used.len().min(MAX_LTP_LONG_SFB);
        info.used[..n].copy_from_slice(&used[..n]);
        Ok(info)
    }
}

/// 单声道的 LTP 历史与预测暂存
pub struct LtpState<T: Real> {
    /// 3072 点历史
    pub history: Vec<T>,
    pub(super) mdct: Mdct<T>,
    pub(super) pred_time: Vec<T>,
    pub(super) pred_freq: Vec<T>,
}

impl<T: Real> LtpState<T> {
    /// 创建全零历史, `mdct_scale` 为预测路径 MDCT 的缩放
    pub fn new(mdct_scale: f64) -> ShengResult<Self> {
        Ok(Self {
            history: sheng_core::error::alloc_zeroed(LTP_STATE_LEN, "LTP 历史")?,
            mdct: Mdct::new(1024, mdct_scale)?,
            pred_time: sheng_core::error::alloc_zeroed(2048, "LTP 预测缓冲")?,
            pred_freq: sheng_core::error::alloc_zeroed(1024, "LTP 预测频谱")?,
        })
    }

    /// 流重置时清空历史
    pub fn reset(&mut self) {
        self.history.fill(T::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_边信息构造() {
        let info = LtpInfo::from_indices(700, 3, &[true; 49]).unwrap();
        assert_eq!(info.coef, 0.911304);
        assert!(info.used.iter().all(|&u| u));
        assert!(LtpInfo::from_indices(700, 8, &[]).is_err());
        assert!(LtpInfo::from_indices(2049, 0, &[]).is_err());
    }

    #[test]
    fn test_重置清零() {
        let mut st = LtpState::<f32>::new(1.0).unwrap();
        st.history.fill(3.0);
        st.reset();
        assert_eq!(st.history.len(), LTP_STATE_LEN);
        assert!(st.history.iter().all(|&v| v == 0.0));
    }
}
