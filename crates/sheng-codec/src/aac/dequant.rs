//! 尺度因子反量化.
//!
//! 浮点路径查 `2^((i - 200) / 4)` 表, 定点路径只做整数偏移, 由后续
//! 定点乘法按指数处理.

use std::marker::PhantomData;
use std::sync::OnceLock;

use sheng_core::float_dsp::{Real, cst};
use sheng_core::{ShengError, ShengResult};

use super::band::{BandType, IcsInfo};

/// pow2sf 表的零点偏置
pub const POW_SF2_ZERO: i32 = 200;

const POW2SF_LEN: usize = 428;

fn pow2sf_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..POW2SF_LEN)
            .map(|i| 2f64.powf((i as f64 - POW_SF2_ZERO as f64) / 4.0))
            .collect()
    })
}

/// `2^((i - 200) / 4)`, 表外索引直接计算
pub fn pow2sf(i: i32) -> f64 {
    match usize::try_from(i) {
        Ok(idx) if idx < POW2SF_LEN => pow2sf_table()[idx],
        _ => 2f64.powf((i - POW_SF2_ZERO) as f64 / 4.0),
    }
}

/// 尺度因子反量化策略
pub trait SfDequant {
    /// 输出尺度因子类型
    type Output: Copy + Default;

    /// 单个频带的反量化
    fn dequant(&self, band_type: BandType, sfo: i32) -> Self::Output;
}

/// 浮点反量化
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatSf<T>(PhantomData<T>);

impl<T> FloatSf<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Real> SfDequant for FloatSf<T> {
    type Output = T;

    fn dequant(&self, band_type: BandType, sfo: i32) -> T {
        match band_type {
            BandType::Zero => T::zero(),
            BandType::Intensity | BandType::Intensity2 => cst(pow2sf(-sfo + POW_SF2_ZERO)),
            BandType::Noise => -cst::<T>(pow2sf(sfo + POW_SF2_ZERO)),
            BandType::Spectral(_) => -cst::<T>(pow2sf(sfo - 100 + POW_SF2_ZERO)),
        }
    }
}

/// 定点反量化
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSf;

impl SfDequant for FixedSf {
    type Output = i32;

    fn dequant(&self, band_type: BandType, sfo: i32) -> i32 {
        match band_type {
            BandType::Zero => 0,
            BandType::Intensity | BandType::Intensity2 => 100 - sfo,
            BandType::Noise => -(100 + sfo),
            BandType::Spectral(_) => -sfo,
        }
    }
}

/// 按组、按游程把 `sfo` 反量化到 `sf`
pub fn dequant_scalefactors<D: SfDequant>(
    dequant: &D,
    ics: &IcsInfo,
    band_type: &[BandType],
    run_end: &[usize],
    sfo: &[i32],
    sf: &mut [D::Output],
) -> ShengResult<()> {
    let total = ics.num_window_groups * ics.max_sfb;
    if band_type.len() < total || run_end.len() < total || sfo.len() < total || sf.len() < total
    {
        return Err(ShengError::InvalidArgument(format!(
            "尺度因子数组长度不足, 需要 {total}"
        )));
    }

    let mut idx = 0;
    for _ in 0..ics.num_window_groups {
        let mut i = 0;
        while i < ics.max_sfb {
            let end = run_end[idx];
            if end <= i || end > ics.max_sfb {
                return Err(ShengError::InvalidData(format!(
                    "频带游程结束位置非法: band={i}, run_end={end}"
                )));
            }
            let bt = band_type[idx];
            for _ in i..end {
                sf[idx] = dequant.dequant(bt, sfo[idx]);
                idx += 1;
            }
            i = end;
        }
    }
    Ok(())
}
