//! 均匀分区卷积的分段.
//!
//! 脉冲响应按层切分: 第一层两个最小分区, 之后每层一个分区且分区长度翻倍,
//! 到达最大分区长度后剩余部分全部归入最后一层. 每层以 2P 点实数 FFT
//! 做重叠相加, 输入按最小分区长度推进, 因此整体无额外延迟.

use num_complex::Complex;
use sheng_core::ShengResult;
use sheng_core::float_dsp::{Real, complex_fmac, cst, vector_fmac_scalar, vector_fmul_scalar};
use sheng_core::tx::Rdft;

/// 一层分段的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentPlan {
    pub part_size: usize,
    pub nb_partitions: usize,
    /// 本层覆盖的第一个抽头
    pub input_offset: usize,
}

/// 不超过 `n` 的最大 2 的幂 (`n >= 1`)
fn floor_pow2(n: usize) -> usize {
    1 << (usize::BITS - 1 - n.max(1).leading_zeros())
}

/// 按最小 / 最大分区长度规划分段, 返回各层布局与最小分区长度
pub(crate) fn plan_segments(
    nb_taps: usize,
    minp: usize,
    maxp: usize,
) -> (Vec<SegmentPlan>, usize) {
    let min_part = floor_pow2(minp);
    let max_part = floor_pow2(maxp).max(min_part);
    let mut part = min_part;
    let mut left = nb_taps;
    let mut offset = 0;
    let mut plans = Vec::new();

    while left > 0 {
        let step = if part == max_part {
            usize::MAX
        } else if plans.is_empty() {
            2
        } else {
            1
        };
        let nb_partitions = step.min(left.div_ceil(part));
        plans.push(SegmentPlan {
            part_size: part,
            nb_partitions,
            input_offset: offset,
        });
        offset += nb_partitions * part;
        left = left.saturating_sub(nb_partitions * part);
        part = (part * 2).min(max_part);
    }
    (plans, min_part)
}

/// 最后一层结束位置, 即新脉冲响应完全生效所需的输入采样数
pub(crate) fn max_offset(plans: &[SegmentPlan]) -> usize {
    plans
        .last()
        .map_or(0, |p| p.input_offset + p.nb_partitions * p.part_size)
}

/// 单声道单层卷积状态
pub(crate) struct FirSegment<T: Real> {
    part_size: usize,
    min_part: usize,
    input_offset: usize,
    rdft: Rdft<T>,
    /// 每个分区的系数频谱, 已含反变换归一化
    coeff: Vec<Vec<Complex<T>>>,
    /// 最近 `nb_partitions` 次输入块的频谱, 按 `part_index` 循环写入
    blockout: Vec<Vec<Complex<T>>>,
    src: Vec<T>,
    tempin: Vec<T>,
    sumin: Vec<Complex<T>>,
    sumout: Vec<T>,
    buffer: Vec<T>,
    output: Vec<T>,
    output_offset: usize,
    part_index: usize,
}

impl<T: Real> FirSegment<T> {
    pub fn new(plan: &SegmentPlan, min_part: usize, taps: &[f64]) -> ShengResult<Self> {
        let p = plan.part_size;
        let block = 2 * p;
        let mut rdft = Rdft::new(block)?;
        let scale: T = cst(1.0 / block as f64);
        let zero = Complex::new(T::zero(), T::zero());
        let mut tempin = vec![T::zero(); block];

        let mut coeff = Vec::with_capacity(plan.nb_partitions);
        for i in 0..plan.nb_partitions {
            tempin.fill(T::zero());
            let start = (plan.input_offset + i * p).min(taps.len());
            let end = (start + p).min(taps.len());
            for (d, &s) in tempin.iter_mut().zip(&taps[start..end]) {
                *d = cst(s);
            }
            let mut spectrum = vec![zero; p + 1];
            rdft.forward(&tempin, &mut spectrum)?;
            for c in &mut spectrum {
                *c = *c * scale;
            }
            coeff.push(spectrum);
        }

        Ok(Self {
            part_size: p,
            min_part,
            input_offset: plan.input_offset,
            rdft,
            coeff,
            blockout: vec![vec![zero; p + 1]; plan.nb_partitions],
            src: vec![T::zero(); plan.input_offset + min_part],
            tempin,
            sumin: vec![zero; p + 1],
            sumout: vec![T::zero(); block],
            buffer: vec![T::zero(); p],
            output: vec![T::zero(); p],
            output_offset: 0,
            part_index: 0,
        })
    }

    /// 送入一个最小分块 (已乘干声增益前的输入), 本层输出累加到 `out`
    pub fn quantum(&mut self, input: &[T], out: &mut [T], dry: T) -> ShengResult<()> {
        let min = self.min_part;
        let p = self.part_size;
        let offset = self.input_offset;
        vector_fmul_scalar(&mut self.src[offset..offset + min], input, dry);

        self.output_offset += min;
        if self.output_offset < p {
            self.src.copy_within(min.., 0);
            let off = self.output_offset;
            vector_fmac_scalar(out, &self.output[off..off + min], T::one());
            return Ok(());
        }
        self.output_offset = 0;

        self.tempin[..p].copy_from_slice(&self.src[..p]);
        self.tempin[p..].fill(T::zero());
        self.rdft.forward(&self.tempin, &mut self.blockout[self.part_index])?;

        let nb_partitions = self.blockout.len();
        self.sumin.fill(Complex::new(T::zero(), T::zero()));
        let mut j = self.part_index;
        for coeff in &self.coeff {
            complex_fmac(&mut self.sumin, &self.blockout[j], coeff);
            j = if j == 0 { nb_partitions - 1 } else { j - 1 };
        }
        self.rdft.inverse(&self.sumin, &mut self.sumout)?;

        for ((o, b), &s) in self.output.iter_mut().zip(&self.buffer).zip(&self.sumout[..p]) {
            *o = *b + s;
        }
        self.buffer.copy_from_slice(&self.sumout[p..]);
        vector_fmac_scalar(out, &self.output[..min], T::one());

        self.src.copy_within(min.., 0);
        self.part_index = (self.part_index + 1) % nb_partitions;
        Ok(())
    }
}

/// 一组分段处理一个最小分块: `out` 被覆盖为湿声输出
pub(crate) fn fir_quantum<T: Real>(
    segments: &mut [FirSegment<T>],
    input: &[T],
    out: &mut [T],
    dry: T,
    wet: T,
) -> ShengResult<()> {
    out.fill(T::zero());
    for seg in segments.iter_mut() {
        seg.quantum(input, out, dry)?;
    }
    if wet != T::one() {
        out.iter_mut().for_each(|v| *v = *v * wet);
    }
    Ok(())
}
