//! 系数字符串解析与格式转换.
//!
//! 每声道的系数以 `|` 分隔, 同一声道内以空格分隔. 复数根写作 `实部±虚部i`,
//! 极坐标写作 `模±角度r` (弧度) 或 `模±角度d` (角度).

use num_complex::Complex;
use sheng_core::{ShengError, ShengResult};

use super::CoeffFormat;

/// 取第 `ch` 个声道的系数字符串, 超出时沿用最后一个
pub(crate) fn channel_str(spec: &str, ch: usize) -> &str {
    let parts: Vec<&str> = spec.split('|').collect();
    parts[ch.min(parts.len() - 1)]
}

/// 解析实数系数列表
pub(crate) fn parse_reals(items: &str) -> ShengResult<Vec<f64>> {
    items
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| ShengError::InvalidArgument(format!("aiir: 无效系数: {tok}")))
        })
        .collect()
}

/// 拆分 `a±b<suffix>` 形式的数对
fn parse_pair(tok: &str, suffix: char) -> ShengResult<(f64, f64)> {
    let invalid = || ShengError::InvalidArgument(format!("aiir: 无效系数: {tok}"));
    let body = tok.strip_suffix(suffix).ok_or_else(invalid)?;
    let bytes = body.as_bytes();
    // 第二个数的符号位: 不在开头且不属于指数
    let split = (1..bytes.len())
        .rev()
        .find(|&i| {
            (bytes[i] == b'+' || bytes[i] == b'-') && !matches!(bytes[i - 1], b'e' | b'E')
        })
        .ok_or_else(invalid)?;
    let first = body[..split].parse::<f64>().map_err(|_| invalid())?;
    let second = body[split..].parse::<f64>().map_err(|_| invalid())?;
    Ok((first, second))
}

/// 按格式解析根列表, 统一转换为 z 平面复数
pub(crate) fn parse_roots(items: &str, format: CoeffFormat) -> ShengResult<Vec<Complex<f64>>> {
    let suffix = match format {
        CoeffFormat::Zp | CoeffFormat::Sp => 'i',
        CoeffFormat::Pr => 'r',
        CoeffFormat::Pd => 'd',
        other => {
            return Err(ShengError::Internal(format!(
                "aiir: 格式 {other:?} 不是零极点格式"
            )));
        }
    };
    items
        .split_whitespace()
        .map(|tok| {
            let (x, y) = parse_pair(tok, suffix)?;
            Ok(match format {
                CoeffFormat::Pr => Complex::from_polar(x, y),
                CoeffFormat::Pd => Complex::from_polar(x, y.to_radians()),
                CoeffFormat::Sp => Complex::new(x, y).exp(),
                _ => Complex::new(x, y),
            })
        })
        .collect()
}

/// 由根展开多项式, 返回 z 的升幂系数 (最高次项为 1).
///
/// 根不成共轭对时展开结果带虚部, 超过单精度 epsilon 即报错.
pub(crate) fn expand(roots: &[Complex<f64>]) -> ShengResult<Vec<f64>> {
    let n = roots.len();
    let mut coefs = vec![Complex::new(0.0, 0.0); n + 1];
    coefs[n] = Complex::new(1.0, 0.0);
    for (i, root) in roots.iter().enumerate() {
        for j in n - (i + 1)..n {
            let t = coefs[j + 1] * root;
            coefs[j] -= t;
        }
    }
    if let Some((i, c)) = coefs
        .iter()
        .enumerate()
        .find(|(_, c)| c.im.abs() > f32::EPSILON as f64)
    {
        return Err(ShengError::InvalidArgument(format!(
            "aiir: z^{i} 的系数 {} 不是实数, 零极点不成共轭对",
            c.im
        )));
    }
    Ok(coefs.iter().map(|c| c.re).collect())
}

/// 零极点转换为 z⁻¹ 升幂的传递函数系数 (b, a)
pub(crate) fn zp2tf(
    zeros: &[Complex<f64>],
    poles: &[Complex<f64>],
) -> ShengResult<(Vec<f64>, Vec<f64>)> {
    let mut b = expand(zeros)?;
    let mut a = expand(poles)?;
    b.reverse();
    a.reverse();
    Ok((b, a))
}

/// 缩放分子使直流增益为 1 (分子和过小时不处理)
pub(crate) fn normalize_coeffs(b: &mut [f64], a: &[f64]) {
    let sum_b: f64 = b.iter().sum();
    if sum_b > 1e-6 {
        let factor = a.iter().sum::<f64>() / sum_b;
        b.iter_mut().for_each(|v| *v *= factor);
    }
}

fn factorial(i: f64) -> f64 {
    if i <= 0.0 { 1.0 } else { i * factorial(i - 1.0) }
}

/// 模拟传递函数第 `n` 项经双线性变换后的系数 (阶数 `order`)
fn coef_sf2zf(a: &[f64], order: usize, n: usize) -> f64 {
    let big_n = order as i64;
    let n = n as i64;
    let mut z = 0.0;
    for (i, &ai) in a.iter().enumerate().take(order + 1) {
        let i = i as i64;
        let mut acc = 0.0;
        for k in (n - big_n + i).max(0)..=i.min(n) {
            let num = factorial(i as f64) * factorial((big_n - i) as f64);
            let den = factorial(k as f64)
                * factorial((i - k) as f64)
                * factorial((n - k) as f64)
                * factorial((big_n - i - n + k) as f64);
            acc += num / den * if k & 1 == 1 { -1.0 } else { 1.0 };
        }
        z += ai * 2f64.powi(i as i32) * acc;
    }
    z
}

/// 模拟传递函数系数转换为数字传递函数系数
pub(crate) fn sf2tf(coeffs: &[f64]) -> Vec<f64> {
    if coeffs.is_empty() {
        return Vec::new();
    }
    let order = coeffs.len() - 1;
    (0..coeffs.len())
        .map(|n| coef_sf2zf(coeffs, order, n))
        .collect()
}

/// 返回第一个模不小于 1 的极点
pub(crate) fn check_stability(poles: &[Complex<f64>]) -> Option<usize> {
    poles.iter().position(|p| p.norm() >= 1.0)
}

/// 返回第一个模不小于 1 的反射系数
pub(crate) fn check_lattice_stability(k: &[f64]) -> Option<usize> {
    k.iter().position(|v| v.abs() >= 1.0)
}
