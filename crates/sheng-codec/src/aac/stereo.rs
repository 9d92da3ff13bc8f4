//! 声道对的 M/S 与强度立体声重建.

use sheng_core::float_dsp::{self, Real, cst};

use super::band::{BandType, ChannelPair, SHORT_LEN};

/// M/S 蝶形的归一化约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsNormalization {
    /// `(a + b, a - b)`, 与参考解码器一致, 两次变换得到 2 倍
    #[default]
    Unity,
    /// `((a + b)/√2, (a - b)/√2)`, 正交变换
    Orthonormal,
}

/// 已解析的蝶形函数
pub type ButterflyFn<T> = fn(&mut [T], &mut [T]);

/// 可做 M/S 蝶形的系数类型
pub trait MsSample: Copy + Default + Send + Sync + 'static {
    fn butterfly_unity(a: &mut [Self], b: &mut [Self]);
    fn butterfly_orthonormal(a: &mut [Self], b: &mut [Self]);
}

impl MsSample for f32 {
    fn butterfly_unity(a: &mut [Self], b: &mut [Self]) {
        float_dsp::butterflies(a, b);
    }

    fn butterfly_orthonormal(a: &mut [Self], b: &mut [Self]) {
        float_dsp::butterflies_scaled(a, b, std::f32::consts::FRAC_1_SQRT_2);
    }
}

impl MsSample for f64 {
    fn butterfly_unity(a: &mut [Self], b: &mut [Self]) {
        float_dsp::butterflies(a, b);
    }

    fn butterfly_orthonormal(a: &mut [Self], b: &mut [Self]) {
        float_dsp::butterflies_scaled(a, b, std::f64::consts::FRAC_1_SQRT_2);
    }
}

/// Q31 格式的 1/√2
const Q31_FRAC_1_SQRT_2: i64 = 0x5A82_799A;

impl MsSample for i32 {
    fn butterfly_unity(a: &mut [Self], b: &mut [Self]) {
        float_dsp::butterflies_fixed(a, b);
    }

    fn butterfly_orthonormal(a: &mut [Self], b: &mut [Self]) {
        let scale = |v: i64| ((v * Q31_FRAC_1_SQRT_2 + (1 << 30)) >> 31) as i32;
        for (x, y) in a.iter_mut().zip(b.iter_mut()) {
            let (l, r) = (*x as i64, *y as i64);
            *x = scale(l + r);
            *y = scale(l - r);
        }
    }
}

impl MsNormalization {
    /// 在配置阶段解析为具体的蝶形函数
    pub fn resolve<T: MsSample>(self) -> ButterflyFn<T> {
        match self {
            Self::Unity => T::butterfly_unity,
            Self::Orthonormal => T::butterfly_orthonormal,
        }
    }
}

/// M/S 立体声解码.
///
/// 仅对 `ms_mask` 置位且两声道码本均小于噪声码本的频带做蝶形,
/// 作用于组内每个窗.
pub fn apply_mid_side_stereo<T: MsSample>(cpe: &mut ChannelPair<T>, butterfly: ButterflyFn<T>) {
    let [ch0, ch1] = &mut cpe.ch;
    let ics = &ch0.ics;
    let offsets = &ics.swb_offset;
    let mut idx = 0;
    let mut win_base = 0;
    for g in 0..ics.num_window_groups {
        for i in 0..ics.max_sfb {
            let coded = |bt: BandType| bt.codebook() < BandType::Noise.codebook();
            if cpe.ms_mask[idx] && coded(ch0.band_type[idx]) && coded(ch1.band_type[idx]) {
                for w in 0..ics.group_len[g] {
                    let base = win_base + w * SHORT_LEN;
                    let range = base + offsets[i]..base + offsets[i + 1];
                    butterfly(&mut ch0.coeffs[range.clone()], &mut ch1.coeffs[range]);
                }
            }
            idx += 1;
        }
        win_base += ics.group_len[g] * SHORT_LEN;
    }
}

/// 强度立体声解码: 由声道 0 按尺度因子重建声道 1 的强度频带
pub fn apply_intensity_stereo<T: Real>(cpe: &mut ChannelPair<T>) {
    let ms_present = cpe.ms_present;
    let [ch0, ch1] = &mut cpe.ch;
    let ics = &ch1.ics;
    let offsets = &ics.swb_offset;
    let mut idx = 0;
    let mut win_base = 0;
    for g in 0..ics.num_window_groups {
        let mut i = 0;
        while i < ics.max_sfb {
            let run_end = ch1.band_type_run_end[idx].clamp(i + 1, ics.max_sfb);
            if !ch1.band_type[idx].is_intensity() {
                idx += run_end - i;
                i = run_end;
                continue;
            }
            for _ in i..run_end {
                let mut c = -1 + 2 * (ch1.band_type[idx].codebook() as i32 - 14);
                if ms_present {
                    c *= 1 - 2 * cpe.ms_mask[idx] as i32;
                }
                let scale = cst::<T>(c as f64) * ch1.sf[idx];
                for w in 0..ics.group_len[g] {
                    let base = win_base + w * SHORT_LEN;
                    let range = base + offsets[i]..base + offsets[i + 1];
                    float_dsp::vector_fmul_scalar(
                        &mut ch1.coeffs[range.clone()],
                        &ch0.coeffs[range],
                        scale,
                    );
                }
                idx += 1;
                i += 1;
            }
        }
        win_base += ics.group_len[g] * SHORT_LEN;
    }
}
