//! 频点声像位置与输出声道权重.
//!
//! 位置坐标均在 [-1, 1]: x 由左 (-1) 到右 (+1), y 由后 (-1) 到前 (+1),
//! z 由下 (-1) 到上 (+1).

use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4, PI};

use num_traits::Float;
use sheng_core::Channel;
use sheng_core::float_dsp::{Real, cst};

fn eps<T: Real>() -> T {
    cst(f32::EPSILON as f64)
}

fn clip<T: Real>(v: T) -> T {
    v.max(-T::one()).min(T::one())
}

fn normal_or_zero<T: Real>(v: T) -> T {
    if v.is_normal() { v } else { T::zero() }
}

/// 由左右声道幅度与互谱求频点位置.
///
/// `re` / `im` 为 L·conj(R) 的实部与 (取反的) 虚部. 非正规结果视为 0,
/// 最终截断到 [-1, 1].
pub(crate) fn stereo_position<T: Real>(l: T, r: T, im: T, re: T) -> (T, T, T) {
    let h2 = (l * l + r * r).sqrt();
    let h1 = (im * im + re * re).sqrt();
    let h1h2 = h1 * h2 + eps();
    let sqrt1_2: T = cst(FRAC_1_SQRT_2);
    let x = sqrt1_2 * (re * r - re * l) / h1h2;
    let y = sqrt1_2 * (re * r + re * l) / h1h2;
    let z = im / (h1 + eps());
    (
        clip(normal_or_zero(x)),
        clip(normal_or_zero(y)),
        clip(normal_or_zero(z)),
    )
}

/// LFE 低通在第 `n` 个频点的权重: `lowcut` 以下为 1, 到 `highcut` 余弦过渡到 0
pub(crate) fn lfe_weight<T: Real>(n: usize, lowcut: T, highcut: T) -> T {
    let n: T = cst(n as f64);
    if n >= highcut {
        T::zero()
    } else if n < lowcut {
        T::one()
    } else {
        let half: T = cst(0.5);
        half * (T::one() + (cst::<T>(PI) * (lowcut - n) / (lowcut - highcut)).cos())
    }
}

fn r_distance<T: Real>(a: T) -> T {
    let t = a.tan();
    (T::one() + t * t)
        .sqrt()
        .min((T::one() + (T::one() / (t + eps())).powi(2)).sqrt())
}

fn sign<T: Real>(v: T) -> T {
    if v > T::zero() {
        T::one()
    } else if v < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

/// 将正前方 ±45° 扇区的声像张角调整为 `angle` 度 (90 为不变)
pub(crate) fn angle_transform<T: Real>(x: &mut T, y: &mut T, angle: T) {
    if angle == cst(90.0) {
        return;
    }
    let pi: T = cst(PI);
    let reference = angle * pi / cst(180.0);
    let mut r = x.hypot(*y);
    let mut a = x.atan2(*y);

    r = r / r_distance(a);
    if Float::abs(a) <= cst(FRAC_PI_4) {
        a = a * reference / cst(FRAC_PI_2);
    } else {
        a = pi
            + (cst::<T>(-2.0) * pi + reference) * (pi - Float::abs(a)) * sign(a)
                / (cst::<T>(3.0) * cst(FRAC_PI_2));
    }
    r = r * r_distance(a);

    *x = clip(a.sin() * r);
    *y = clip(a.cos() * r);
}

/// 平移一个坐标轴
pub(crate) fn shift_transform<T: Real>(v: &mut T, shift: T) {
    if shift != T::zero() {
        *v = clip(*v + shift);
    }
}

/// 沿同号方向拉伸一个坐标轴: 正值只作用于正半轴, 负值只作用于负半轴
pub(crate) fn depth_transform<T: Real>(v: &mut T, depth: T) {
    if depth == T::zero()
        || (depth < T::zero() && *v > T::zero())
        || (depth > T::zero() && *v < T::zero())
    {
        return;
    }
    *v = clip(*v + *v * depth);
}

/// 水平面内聚焦 (正值向外推) 或散焦 (负值向中心收)
pub(crate) fn focus_transform<T: Real>(x: &mut T, y: &mut T, focus: T) {
    if focus == T::zero() {
        return;
    }
    let a = x.atan2(*y);
    let ra = r_distance(a);
    let mut r = (x.hypot(*y) / ra).max(T::zero()).min(T::one());
    let twenty: T = cst(20.0);
    r = if focus > T::zero() {
        T::one() - (T::one() - r).powf(T::one() + focus * twenty)
    } else {
        r.powf(T::one() - focus * twenty)
    };
    r = r * ra;
    *x = clip(a.sin() * r);
    *y = clip(a.cos() * r);
}

/// 坐标到单轴权重的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AxisMap {
    /// `0.5 + 0.5v`
    Rising,
    /// `0.5 - 0.5v`
    Falling,
    /// `1 - |v|`
    Centre,
    /// 直接取坐标值
    Raw,
}

impl AxisMap {
    #[inline]
    fn apply<T: Real>(self, v: T) -> T {
        let half: T = cst(0.5);
        match self {
            Self::Rising => half + half * v,
            Self::Falling => half - half * v,
            Self::Centre => T::one() - Float::abs(v),
            Self::Raw => v,
        }
    }
}

/// 输出声道在三个轴上的权重映射与差信号符号
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChannelPan {
    pub x: AxisMap,
    pub y: AxisMap,
    pub z: AxisMap,
    /// 左声道 +1, 右声道 -1, 其余 0
    pub dif_sign: f64,
}

impl ChannelPan {
    pub fn of(channel: Channel) -> Self {
        use Channel::*;

        // x 与 stereo_position 同号: 左侧为负, 所以左声道取 0.5 - 0.5x.
        // FFmpeg 给 FRONT_LEFT 的是 0.5 + 0.5x, 会把左侧内容送进右声道.
        // 偏中声道 (FLC / FRC) 不在左右分组里, 与 FFmpeg 一样直接取坐标值.
        let (x, dif_sign) = match channel {
            FrontLeft | SideLeft | BackLeft | TopFrontLeft | TopBackLeft | TopSideLeft
            | BottomFrontLeft => (AxisMap::Falling, 1.0),
            FrontRight | SideRight | BackRight | TopFrontRight | TopBackRight | TopSideRight
            | BottomFrontRight => (AxisMap::Rising, -1.0),
            FrontLeftOfCenter => (AxisMap::Raw, 1.0),
            FrontRightOfCenter => (AxisMap::Raw, -1.0),
            _ => (AxisMap::Centre, 0.0),
        };
        let y = match channel {
            FrontLeft | FrontRight | FrontCenter | TopFrontLeft | TopFrontCenter
            | TopFrontRight | BottomFrontLeft | BottomFrontCenter | BottomFrontRight => {
                AxisMap::Rising
            }
            BackLeft | BackRight | BackCenter | TopBackLeft | TopBackCenter | TopBackRight => {
                AxisMap::Falling
            }
            FrontLeftOfCenter | FrontRightOfCenter => AxisMap::Raw,
            _ => AxisMap::Centre,
        };
        let z = match channel {
            TopCenter | TopFrontLeft | TopFrontCenter | TopFrontRight | TopBackLeft
            | TopBackCenter | TopBackRight | TopSideLeft | TopSideRight => AxisMap::Rising,
            BottomFrontLeft | BottomFrontCenter | BottomFrontRight => AxisMap::Falling,
            _ => AxisMap::Centre,
        };
        Self { x, y, z, dif_sign }
    }
}

/// 按位置计算一个输出声道的逐频点权重, 非正规结果置 0.
///
/// `spread` 为三个轴的指数; 三者均为 2 时走平方快速路径.
pub(crate) fn calculate_factors<T: Real>(
    pan: &ChannelPan,
    spread: [T; 3],
    pos: (&[T], &[T], &[T]),
    factors: &mut [T],
) {
    let two: T = cst(2.0);
    let power2 = spread.iter().all(|&s| s == two);
    let (xs, ys, zs) = pos;
    for (n, f) in factors.iter_mut().enumerate() {
        let x = pan.x.apply(xs[n]);
        let y = pan.y.apply(ys[n]);
        let z = pan.z.apply(zs[n]);
        let v = if power2 {
            let p = x * y * z;
            p * p
        } else {
            x.powf(spread[0]) * y.powf(spread[1]) * z.powf(spread[2])
        };
        *f = normal_or_zero(v);
    }
}
