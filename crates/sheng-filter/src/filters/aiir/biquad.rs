//! 零极点分解为级联双二阶节, 以及级联到并联形式的转换.

use num_complex::Complex;
use sheng_core::{ShengError, ShengResult};

use super::coeffs::expand;

/// 二阶节, 转置直接 II 型
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Biquad {
    /// 分母 [1, a1, a2]
    pub a: [f64; 3],
    /// 分子 [b0, b1, b2]
    pub b: [f64; 3],
    pub w1: f64,
    pub w2: f64,
}

impl Biquad {
    #[inline]
    pub fn tick(&mut self, x: f64) -> f64 {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let y = b0 * x + self.w1;
        self.w1 = b1 * x + self.w2 - a1 * y;
        self.w2 = b2 * x - a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.w1 = 0.0;
        self.w2 = 0.0;
    }

    /// 非正规状态清零
    pub fn flush_state(&mut self) {
        if !self.w1.is_normal() {
            self.w1 = 0.0;
        }
        if !self.w2.is_normal() {
            self.w2 = 0.0;
        }
    }
}

fn is_conjugate(a: Complex<f64>, b: Complex<f64>) -> bool {
    a.re == b.re && a.im == -b.im
}

/// 在未消耗的根中找出与 `root` 配对的另一根.
///
/// 复根必须有共轭 (否则报错); 实根取 `score` 最小的另一个实根, 没有时返回 `None`.
fn find_partner(
    roots: &[Complex<f64>],
    used: &[bool],
    root: Complex<f64>,
    score: impl Fn(Complex<f64>) -> f64,
) -> ShengResult<Option<usize>> {
    if root.im != 0.0 {
        return roots
            .iter()
            .enumerate()
            .find(|(i, r)| !used[*i] && is_conjugate(**r, root))
            .map(|(i, _)| Some(i))
            .ok_or_else(|| {
                ShengError::InvalidArgument(format!("aiir: 根 {root} 缺少共轭"))
            });
    }
    Ok(roots
        .iter()
        .enumerate()
        .filter(|(i, r)| !used[*i] && r.im == 0.0)
        .min_by(|(_, x), (_, y)| score(**x).total_cmp(&score(**y)))
        .map(|(i, _)| i))
}

/// 零极点分解为级联二阶节.
///
/// 每节取最外侧的未消耗极点及其共轭, 配上离它最近的零点及其共轭. 零点不足时
/// 按原点处的零点处理, 极点不足时报错. `g` 并入第一节分子.
pub(crate) fn decompose_zp2biquads(
    zeros: &[Complex<f64>],
    poles: &[Complex<f64>],
    g: f64,
    normalize: bool,
) -> ShengResult<Vec<Biquad>> {
    let nb_biquads = (zeros.len().max(poles.len()) + 1) / 2;
    let mut pole_used = vec![false; poles.len()];
    let mut zero_used = vec![false; zeros.len()];
    let mut biquads = Vec::with_capacity(nb_biquads);
    let origin = Complex::new(0.0, 0.0);

    for section in 0..nb_biquads {
        let p1 = poles
            .iter()
            .enumerate()
            .filter(|(i, _)| !pole_used[*i])
            .max_by(|(_, x), (_, y)| x.norm().total_cmp(&y.norm()))
            .map(|(i, _)| i)
            .ok_or_else(|| {
                ShengError::InvalidArgument(format!(
                    "aiir: 第 {section} 节没有可用极点, 零极点数量不匹配"
                ))
            })?;
        pole_used[p1] = true;
        let pole = poles[p1];
        // 实极点配对时取模最大的另一个实极点
        let p2 = find_partner(poles, &pole_used, pole, |r| -r.norm())?;
        if let Some(i) = p2 {
            pole_used[i] = true;
        }

        let z1 = zeros
            .iter()
            .enumerate()
            .filter(|(i, _)| !zero_used[*i])
            .min_by(|(_, x), (_, y)| (*x - pole).norm().total_cmp(&(*y - pole).norm()))
            .map(|(i, _)| i);
        let z2 = match z1 {
            Some(i) => {
                zero_used[i] = true;
                let partner = find_partner(zeros, &zero_used, zeros[i], |r| (r - pole).norm())?;
                if let Some(j) = partner {
                    zero_used[j] = true;
                }
                partner
            }
            None => None,
        };

        let pick = |roots: &[Complex<f64>], i: Option<usize>| i.map_or(origin, |i| roots[i]);
        let b = expand(&[pick(zeros, z1), pick(zeros, z2)])?;
        let a = expand(&[pole, pick(poles, p2)])?;

        let mut bq = Biquad {
            a: [1.0, a[1] / a[2], a[0] / a[2]],
            b: [b[2] / a[2], b[1] / a[2], b[0] / a[2]],
            ..Default::default()
        };
        if normalize {
            let sum_b: f64 = bq.b.iter().sum();
            if sum_b.abs() > 1e-6 {
                let factor = bq.a.iter().sum::<f64>() / sum_b;
                bq.b.iter_mut().for_each(|v| *v *= factor);
            }
        }
        if section == 0 {
            bq.b.iter_mut().for_each(|v| *v *= g);
        }
        log::debug!("aiir: 第 {section} 节 a={:?} b={:?}", bq.a, bq.b);
        biquads.push(bq);
    }
    Ok(biquads)
}

/// 部分主元 LU 分解求解 `m x = y`, `m` 按行存储
fn solve(mut m: Vec<Vec<f64>>, mut y: Vec<f64>) -> ShengResult<Vec<f64>> {
    let n = y.len();
    let scale = m
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() <= scale * 1e-12 {
            return Err(ShengError::InvalidArgument(
                "aiir: 级联形式无法转换为并联形式 (矩阵奇异)".into(),
            ));
        }
        m.swap(col, pivot);
        y.swap(col, pivot);
        for row in col + 1..n {
            let f = m[row][col] / m[col][col];
            if f == 0.0 {
                continue;
            }
            for k in col..n {
                m[row][k] -= f * m[col][k];
            }
            y[row] -= f * y[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let acc: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (y[row] - acc) / m[row][row];
    }
    Ok(x)
}

/// 单位冲激通过一组二阶节的响应
fn impulse_response(biquads: &[Biquad], len: usize) -> Vec<f64> {
    let mut chain: Vec<Biquad> = biquads.to_vec();
    chain.iter_mut().for_each(Biquad::reset);
    (0..len)
        .map(|n| {
            let x = if n == 0 { 1.0 } else { 0.0 };
            chain.iter_mut().fold(x, |v, bq| bq.tick(v))
        })
        .collect()
}

/// 级联二阶节转换为并联形式, 返回 (各节, 直通增益).
///
/// 并联各节保留原分母, 分子为 `[0, b1, b2]`; 分子系数由级联与并联的
/// 冲激响应在前 `2N + 1` 点相等求得.
pub(crate) fn convert_serial2parallel(biquads: &[Biquad]) -> ShengResult<(Vec<Biquad>, f64)> {
    let nb = biquads.len();
    let length = 2 * nb + 1;
    let target = impulse_response(biquads, length);

    let mut m = vec![vec![0.0; 2 * nb]; 2 * nb];
    for (n, bq) in biquads.iter().enumerate() {
        let all_pole = Biquad {
            a: bq.a,
            b: [1.0, 0.0, 0.0],
            ..Default::default()
        };
        let resp = impulse_response(&[all_pole], length - 1);
        for row in 0..2 * nb {
            m[row][2 * n] = resp[row];
            m[row][2 * n + 1] = if row == 0 { 0.0 } else { resp[row - 1] };
        }
    }
    let x = solve(m, target[1..].to_vec())?;

    let parallel = biquads
        .iter()
        .enumerate()
        .map(|(n, bq)| Biquad {
            a: bq.a,
            b: [0.0, x[2 * n], x[2 * n + 1]],
            ..Default::default()
        })
        .collect();
    Ok((parallel, target[0]))
}
