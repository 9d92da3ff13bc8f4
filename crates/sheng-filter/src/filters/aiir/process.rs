//! 各种 IIR 实现形式的逐采样处理.

use sheng_core::Sample;

use super::biquad::Biquad;

/// 滤镜级增益
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gains {
    /// 输入增益
    pub dry: f64,
    /// 输出增益
    pub wet: f64,
    /// 湿声比例
    pub mix: f64,
}

/// 单声道的实现形式与状态
#[derive(Debug, Clone)]
pub(crate) enum Realization {
    /// 直接型, `ic` / `oc` 为输入 / 输出历史
    Direct {
        b: Vec<f64>,
        a: Vec<f64>,
        ic: Vec<f64>,
        oc: Vec<f64>,
    },
    Serial(Vec<Biquad>),
    Parallel { biquads: Vec<Biquad>, fir: f64 },
    /// 格型梯形: `k` 反射系数, `v` 梯形系数 (比 `k` 多一个)
    Lattice { k: Vec<f64>, v: Vec<f64>, x: Vec<f64> },
}

impl Realization {
    pub fn direct(b: Vec<f64>, a: Vec<f64>) -> Self {
        let (nb, na) = (b.len(), a.len());
        Self::Direct {
            b,
            a,
            ic: vec![0.0; nb],
            oc: vec![0.0; na],
        }
    }

    pub fn lattice(k: Vec<f64>, v: Vec<f64>) -> Self {
        let stages = k.len();
        Self::Lattice {
            k,
            v,
            x: vec![0.0; stages + 1],
        }
    }

    /// 块结束时把非正规的递归状态清零
    fn flush_state(&mut self) {
        let flush = |v: &mut f64| {
            if !v.is_normal() {
                *v = 0.0;
            }
        };
        match self {
            Self::Direct { ic, oc, .. } => ic.iter_mut().chain(oc.iter_mut()).for_each(flush),
            Self::Serial(biquads) | Self::Parallel { biquads, .. } => {
                biquads.iter_mut().for_each(Biquad::flush_state)
            }
            Self::Lattice { x, .. } => x.iter_mut().for_each(flush),
        }
    }
}

#[inline]
fn direct_tick(b: &[f64], a: &[f64], ic: &mut [f64], oc: &mut [f64], input: f64) -> f64 {
    if !ic.is_empty() {
        ic.copy_within(..ic.len() - 1, 1);
        ic[0] = input;
    }
    if !oc.is_empty() {
        oc.copy_within(..oc.len() - 1, 1);
    }
    let mut y: f64 = b.iter().zip(ic.iter()).map(|(c, v)| c * v).sum();
    y -= a
        .iter()
        .zip(oc.iter())
        .skip(1)
        .map(|(c, v)| c * v)
        .sum::<f64>();
    if let Some(o) = oc.first_mut() {
        *o = y;
    }
    y
}

#[inline]
fn lattice_tick(k: &[f64], v: &[f64], x: &mut [f64], input: f64) -> f64 {
    let stages = k.len();
    let mut n1 = input;
    let mut out = 0.0;
    for i in (0..stages).rev() {
        let n0 = n1 - k[i] * x[i];
        let p0 = n0 * k[i] + x[i];
        out += p0 * v[i + 1];
        x[i] = p0;
        n1 = n0;
    }
    out += n1 * v[0];
    x.copy_within(..stages, 1);
    x[0] = n1;
    out
}

/// 整个滤波器外套一次干湿混合, 返回削波次数
fn mix_block<S: Sample>(
    src: &[S],
    dst: &mut [S],
    gains: Gains,
    mut filter: impl FnMut(f64) -> f64,
) -> usize {
    let mut clippings = 0;
    for (d, &s) in dst.iter_mut().zip(src) {
        let dry = s.to_f64() * gains.dry;
        let wet = filter(dry) * gains.wet;
        let (out, clipped) = S::from_f64_clipped(wet * gains.mix + dry * (1.0 - gains.mix));
        clippings += usize::from(clipped);
        *d = out;
    }
    clippings
}

/// 级联形式逐节处理: 每节都乘输入增益、做干湿混合并按采样格式截断.
///
/// 与 FFmpeg 相同, 从最后一节开始, 前一节的 (已截断) 输出作为下一节的输入.
fn serial_block<S: Sample>(
    biquads: &mut [Biquad],
    src: &[S],
    dst: &mut [S],
    gains: Gains,
) -> usize {
    let mut clippings = 0;
    dst.copy_from_slice(src);
    for bq in biquads.iter_mut().rev() {
        for d in dst.iter_mut() {
            let i0 = d.to_f64() * gains.dry;
            let o0 = bq.tick(i0) * gains.wet;
            let (out, clipped) = S::from_f64_clipped(o0 * gains.mix + i0 * (1.0 - gains.mix));
            clippings += usize::from(clipped);
            *d = out;
        }
    }
    clippings
}

/// 单声道 IIR 状态
#[derive(Debug, Clone)]
pub(crate) struct IirChannel {
    pub realization: Realization,
    /// 本块削波次数
    pub clippings: usize,
}

impl IirChannel {
    pub fn new(realization: Realization) -> Self {
        Self {
            realization,
            clippings: 0,
        }
    }

    /// 处理一个声道的一块采样, 结果写入等长的 `dst`
    pub fn process<S: Sample>(&mut self, src: &[S], dst: &mut [S], gains: Gains) {
        self.clippings += match &mut self.realization {
            Realization::Direct { b, a, ic, oc } => {
                mix_block(src, dst, gains, |x| direct_tick(b, a, ic, oc, x))
            }
            Realization::Serial(biquads) => serial_block(biquads, src, dst, gains),
            Realization::Parallel { biquads, fir } => mix_block(src, dst, gains, |x| {
                *fir * x + biquads.iter_mut().map(|bq| bq.tick(x)).sum::<f64>()
            }),
            Realization::Lattice { k, v, x } => {
                mix_block(src, dst, gains, |input| lattice_tick(k, v, x, input))
            }
        };
        self.realization.flush_state();
    }
}
