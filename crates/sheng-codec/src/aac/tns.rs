//! 时域噪声整形 (TNS).
//!
//! 在频域上沿频率方向做自适应滤波. 解码时为全极点 (AR) 合成,
//! LTP 预测路径上为全零 (MA) 分析.

use sheng_core::float_dsp::{Real, cst};
use sheng_core::{ShengError, ShengResult};

use super::band::{IcsInfo, SHORT_LEN};

/// TNS 滤波器最大阶数
pub const TNS_MAX_ORDER: usize = 20;

/// TNS 滤波方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TnsMode {
    /// 全极点合成 (解码)
    Synthesis,
    /// 全零分析 (LTP 预测)
    Analysis,
}

/// 每个窗的 TNS 滤波器参数
#[derive(Debug, Clone)]
pub struct TnsData {
    pub present: bool,
    pub n_filt: [usize; 8],
    /// 覆盖的频带数
    pub length: [[usize; 4]; 8],
    pub order: [[usize; 4]; 8],
    /// true 表示从高频向低频滤波
    pub direction: [[bool; 4]; 8],
    /// 反量化后的反射系数
    pub coef: [[[f64; TNS_MAX_ORDER]; 4]; 8],
}

impl Default for TnsData {
    fn default() -> Self {
        Self {
            present: false,
            n_filt: [0; 8],
            length: [[0; 4]; 8],
            order: [[0; 4]; 8],
            direction: [[false; 4]; 8],
            coef: [[[0.0; TNS_MAX_ORDER]; 4]; 8],
        }
    }
}

impl TnsData {
    /// 设置窗 `w` 的第 `filt` 个滤波器
    pub fn set_filter(
        &mut self,
        w: usize,
        filt: usize,
        length: usize,
        direction: bool,
        coefs: &[f64],
    ) -> ShengResult<()> {
        if w >= 8 || filt >= 4 || coefs.len() > TNS_MAX_ORDER {
            return Err(ShengError::InvalidArgument(format!(
                "TNS 滤波器参数越界: window={w}, filter={filt}, order={}",
                coefs.len()
            )));
        }
        self.present = true;
        self.n_filt[w] = self.n_filt[w].max(filt + 1);
        self.length[w][filt] = length;
        self.order[w][filt] = coefs.len();
        self.direction[w][filt] = direction;
        self.coef[w][filt][..coefs.len()].copy_from_slice(coefs);
        Ok(())
    }
}

/// 由比特流索引反量化 TNS 反射系数.
///
/// `coef_res` 为 3 或 4 位分辨率, `coef_compress` 时少传 1 位.
pub fn tns_coef_from_index(coef_res: u32, coef_compress: bool, index: u32) -> ShengResult<f64> {
    if !(3..=4).contains(&coef_res) {
        return Err(ShengError::InvalidData(format!(
            "AAC TNS 系数分辨率非法: {coef_res}"
        )));
    }
    let bits = coef_res - coef_compress as u32;
    if index >= 1 << bits {
        return Err(ShengError::InvalidData(format!(
            "AAC TNS 系数索引越界: bits={bits}, index={index}"
        )));
    }
    let half_pi = std::f64::consts::FRAC_PI_2;
    let iqfac = ((1 << (coef_res - 1)) as f64 - 0.5) / half_pi;
    let iqfac_m = ((1 << (coef_res - 1)) as f64 + 0.5) / half_pi;
    // 按 bits 位做符号扩展
    let shift = 32 - bits;
    let q = ((index << shift) as i32 >> shift) as f64;
    Ok((q / if q >= 0.0 { iqfac } else { iqfac_m }).sin())
}

/// 反射系数转换为直接型 LPC 系数
pub fn compute_tns_lpc<T: Real>(refl: &[f64]) -> [T; TNS_MAX_ORDER] {
    let mut lpc = [T::zero(); TNS_MAX_ORDER];
    for (m, &k) in refl.iter().take(TNS_MAX_ORDER).enumerate() {
        let r = cst::<T>(k);
        for i in 0..m / 2 {
            let f = lpc[i];
            let b = lpc[m - 1 - i];
            lpc[i] = f + r * b;
            lpc[m - 1 - i] = b + r * f;
        }
        if m % 2 == 1 {
            let mid = m / 2;
            lpc[mid] = lpc[mid] + r * lpc[mid];
        }
        lpc[m] = r;
    }
    lpc
}

/// 对频谱应用 TNS
pub fn apply_tns<T: Real>(coef: &mut [T], tns: &TnsData, ics: &IcsInfo, mode: TnsMode) {
    let mmm = ics.tns_max_bands.min(ics.max_sfb);
    let mut tmp = [T::zero(); TNS_MAX_ORDER + 1];

    for w in 0..ics.num_windows {
        let mut bottom = ics.num_swb;
        for filt in 0..tns.n_filt[w] {
            let top = bottom;
            bottom = top.saturating_sub(tns.length[w][filt]);
            let order = tns.order[w][filt].min(TNS_MAX_ORDER);
            if order == 0 {
                continue;
            }

            let lpc: [T; TNS_MAX_ORDER] = compute_tns_lpc(&tns.coef[w][filt][..order]);

            let start = ics.swb_offset[bottom.min(mmm)];
            let end = ics.swb_offset[top.min(mmm)];
            if end <= start {
                continue;
            }
            let size = end - start;
            let reverse = tns.direction[w][filt];
            let base = w * SHORT_LEN;
            // 第 m 个被滤波的系数位置
            let pos = |m: usize| if reverse { base + end - 1 - m } else { base + start + m };

            match mode {
                TnsMode::Synthesis => {
                    for m in 0..size {
                        let cur = pos(m);
                        let mut acc = coef[cur];
                        for i in 1..=m.min(order) {
                            acc = acc - coef[pos(m - i)] * lpc[i - 1];
                        }
                        coef[cur] = acc;
                    }
                }
                TnsMode::Analysis => {
                    tmp.fill(T::zero());
                    for m in 0..size {
                        let cur = pos(m);
                        tmp[0] = coef[cur];
                        let mut acc = coef[cur];
                        for i in 1..=m.min(order) {
                            acc = acc + tmp[i] * lpc[i - 1];
                        }
                        coef[cur] = acc;
                        tmp.copy_within(0..order, 1);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::band::WindowSequence;

    #[test]
    fn test_系数反量化() {
        // 4 位分辨率, 不压缩: 索引 1 -> sin(1 / (7.5 / (π/2)))
        let v = tns_coef_from_index(4, false, 1).unwrap();
        let iq = 7.5 / std::f64::consts::FRAC_PI_2;
        assert!((v - (1.0 / iq).sin()).abs() < 1e-12);
        // 3 位压缩为 2 位: 索引 2 符号扩展为 -2
        let v = tns_coef_from_index(3, true, 2).unwrap();
        let iq_m = 4.5 / std::f64::consts::FRAC_PI_2;
        assert!((v - (-2.0 / iq_m).sin()).abs() < 1e-12);
        assert!(tns_coef_from_index(3, true, 4).is_err());
        assert!(tns_coef_from_index(5, false, 0).is_err());
    }

    #[test]
    fn test_反射系数到_lpc() {
        let lpc: [f64; TNS_MAX_ORDER] = compute_tns_lpc(&[0.5, 0.25]);
        // a1 = k1 + k2·k1, a2 = k2
        assert!((lpc[0] - 0.625).abs() < 1e-12);
        assert!((lpc[1] - 0.25).abs() < 1e-12);
        assert_eq!(lpc[2], 0.0);
    }

    #[test]
    fn test_合成与分析互逆() {
        let ics = IcsInfo::long(WindowSequence::OnlyLong, 30).unwrap();
        let mut tns = TnsData::default();
        tns.set_filter(0, 0, 20, false, &[0.6, -0.3, 0.1]).unwrap();
        tns.set_filter(0, 1, 15, true, &[-0.4, 0.2]).unwrap();

        let original: Vec<f64> = (0..1024).map(|i| ((i * 37 % 101) as f64 - 50.0) / 50.0).collect();
        let mut coef = original.clone();
        apply_tns(&mut coef, &tns, &ics, TnsMode::Analysis);
        assert!(coef.iter().zip(&original).any(|(a, b)| a != b), "分析滤波应改变频谱");
        // 两个滤波器作用区间不重叠, 逐个求逆即可还原
        apply_tns(&mut coef, &tns, &ics, TnsMode::Synthesis);
        for (a, b) in coef.iter().zip(&original) {
            assert!((a - b).abs() < 1e-9, "合成未还原分析结果");
        }
    }

    #[test]
    fn test_零阶滤波器跳过() {
        let ics = IcsInfo::long(WindowSequence::OnlyLong, 49).unwrap();
        let mut tns = TnsData::default();
        tns.set_filter(0, 0, 49, false, &[]).unwrap();
        let mut coef = vec![1.0f32; 1024];
        apply_tns(&mut coef, &tns, &ics, TnsMode::Synthesis);
        assert!(coef.iter().all(|&v| v == 1.0));
    }
}
