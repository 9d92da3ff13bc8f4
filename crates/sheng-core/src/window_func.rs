//! 窗函数.
//!
//! 对标 FFmpeg 的 `window_func.h` 与 AAC 的 sine / KBD 窗表.
//! 分析窗采用周期形式, 保证 50% / 75% 重叠时叠加为常数.

use std::f64::consts::PI;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// 分析 / 合成窗类型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunc {
    /// 矩形窗
    Rect,
    /// Hann 窗
    Hann,
    /// Hamming 窗
    Hamming,
    /// Blackman 窗
    Blackman,
    /// 正弦窗
    Sine,
    /// Kaiser-Bessel 派生窗, 参数为 alpha
    Kbd(f64),
}

impl WindowFunc {
    /// 生成长度为 `len` 的窗表
    pub fn generate(&self, len: usize) -> Vec<f64> {
        let n = len as f64;
        match *self {
            Self::Rect => vec![1.0; len],
            Self::Hann => (0..len)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n).cos())
                .collect(),
            Self::Hamming => (0..len)
                .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n).cos())
                .collect(),
            Self::Blackman => (0..len)
                .map(|i| {
                    let x = 2.0 * PI * i as f64 / n;
                    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
                })
                .collect(),
            Self::Sine => sine_window(len),
            Self::Kbd(alpha) => {
                let half = len / 2;
                let rising = kbd_half_window(half, alpha);
                let mut w = rising.clone();
                w.extend(rising.iter().rev());
                w.resize(len, 0.0);
                w
            }
        }
    }
}

/// 正弦窗 `sin(π(n + ½)/N)`
pub fn sine_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (PI / len as f64 * (i as f64 + 0.5)).sin())
        .collect()
}

/// KBD 窗的上升半段 (长度 `half`), 对应 `2·half` 点变换
pub fn kbd_half_window(half: usize, alpha: f64) -> Vec<f64> {
    if half == 0 {
        return Vec::new();
    }
    // Kaiser 原型长度为 half + 1
    let h = half as f64;
    let mut cum = Vec::with_capacity(half + 1);
    let mut running = 0.0;
    for j in 0..=half {
        let x = 2.0 * j as f64 / h - 1.0;
        running += bessel_i0(PI * alpha * (1.0 - x * x).max(0.0).sqrt());
        cum.push(running);
    }
    let total = cum[half];
    cum[..half].iter().map(|&c| (c / total).sqrt()).collect()
}

/// 第一类修正贝塞尔函数 I0 (级数展开)
pub fn bessel_i0(x: f64) -> f64 {
    let q = x * x * 0.25;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..64 {
        let kf = k as f64;
        term *= q / (kf * kf);
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
    }
    sum
}

// ============================================================
// AAC 窗表
// ============================================================

/// AAC 窗形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowShape {
    /// 正弦窗
    #[default]
    Sine,
    /// KBD 窗 (长窗 α=4, 短窗 α=6)
    Kbd,
}

struct AacWindows {
    long_sine: Vec<f64>,
    long_kbd: Vec<f64>,
    short_sine: Vec<f64>,
    short_kbd: Vec<f64>,
}

fn aac_windows() -> &'static AacWindows {
    static TABLES: OnceLock<AacWindows> = OnceLock::new();
    TABLES.get_or_init(|| AacWindows {
        long_sine: sine_window(2048)[..1024].to_vec(),
        long_kbd: kbd_half_window(1024, 4.0),
        short_sine: sine_window(256)[..128].to_vec(),
        short_kbd: kbd_half_window(128, 6.0),
    })
}

/// 长窗上升半段 (1024 点)
pub fn aac_long_window(shape: WindowShape) -> &'static [f64] {
    let t = aac_windows();
    match shape {
        WindowShape::Sine => &t.long_sine,
        WindowShape::Kbd => &t.long_kbd,
    }
}

/// 短窗上升半段 (128 点)
pub fn aac_short_window(shape: WindowShape) -> &'static [f64] {
    let t = aac_windows();
    match shape {
        WindowShape::Sine => &t.short_sine,
        WindowShape::Kbd => &t.short_kbd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_半重叠叠加为常数() {
        let w = WindowFunc::Hann.generate(64);
        for i in 0..32 {
            assert!((w[i] + w[i + 32] - 1.0).abs() < 1e-12, "位置 {i} 叠加不为 1");
        }
    }

    #[test]
    fn test_kbd_满足_princen_bradley() {
        for (half, alpha) in [(1024usize, 4.0), (128, 6.0)] {
            let w = kbd_half_window(half, alpha);
            assert_eq!(w.len(), half);
            for i in 0..half {
                let s = w[i] * w[i] + w[half - 1 - i] * w[half - 1 - i];
                assert!((s - 1.0).abs() < 1e-9, "half={half} i={i} 能量和 {s}");
            }
            assert!(w.windows(2).all(|p| p[0] <= p[1]), "KBD 上升段应单调");
        }
    }

    #[test]
    fn test_aac_窗表长度() {
        assert_eq!(aac_long_window(WindowShape::Sine).len(), 1024);
        assert_eq!(aac_short_window(WindowShape::Kbd).len(), 128);
        let s = aac_short_window(WindowShape::Sine);
        assert!((s[0] - (PI / 256.0 * 0.5).sin()).abs() < 1e-15);
    }

    #[test]
    fn test_kbd_完整窗对称() {
        let w = WindowFunc::Kbd(4.0).generate(32);
        assert_eq!(w.len(), 32);
        for i in 0..16 {
            assert!((w[i] - w[31 - i]).abs() < 1e-15);
        }
    }

    #[test]
    fn test_bessel_i0() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008_4).abs() < 1e-12);
    }
}
