//! 脉冲响应预处理: 延迟估计、增益归一化、截断与缩放.

use sheng_core::{ShengError, ShengResult};

use super::AfirConfig;

/// 预处理后的脉冲响应
#[derive(Debug, Clone)]
pub(crate) struct PreparedIr {
    /// 每声道系数, 长度均为 `nb_taps`
    pub taps: Vec<Vec<f64>>,
    pub nb_taps: usize,
    /// 各声道延迟的最小值 (采样)
    pub delay: usize,
}

/// 估计单声道脉冲响应的群延迟, 返回 (延迟, 去掉尾部静音后的抽头数).
///
/// 首尾幅度不超过 `eps` 的采样视为静音. 剩余部分对称或反对称时取中点,
/// 否则取峰值位置.
pub(crate) fn ir_delay(time: &[f64], eps: f64) -> (usize, usize) {
    let Some(start) = time.iter().position(|v| v.abs() > eps) else {
        return (0, 0);
    };
    let stop = time.iter().rposition(|v| v.abs() > eps).unwrap_or(start);
    let real = stop - start + 1;

    let body = &time[start..=stop];
    let half = real / 2;
    let symmetric = (0..half).all(|i| body[i] == body[real - 1 - i]);
    let antisymmetric = (0..half).all(|i| body[i] == -body[real - 1 - i]);

    let delay = if symmetric || antisymmetric {
        start + (real - 1) / 2
    } else {
        let mut peak = 0.0;
        let mut delay = start;
        for (i, v) in body.iter().enumerate() {
            if v.abs() > peak {
                peak = v.abs();
                delay = start + i;
            }
        }
        delay
    };
    (delay, stop + 1)
}

/// 按范数计算声道增益: 负值不归一化, 0 按系数和, p 按 p 范数
pub(crate) fn ir_gain(time: &[f64], norm: f64) -> f64 {
    if norm < 0.0 {
        1.0
    } else if norm == 0.0 {
        1.0 / time.iter().sum::<f64>()
    } else {
        let sum: f64 = time.iter().map(|v| v.abs().powf(norm)).sum();
        1.0 / sum.powf(1.0 / norm)
    }
}

/// 预处理一个多声道脉冲响应
pub(crate) fn prepare_ir(
    ir: &[Vec<f64>],
    config: &AfirConfig,
    eps: f64,
) -> ShengResult<PreparedIr> {
    let len = ir.first().map_or(0, Vec::len);
    if len == 0 {
        return Err(ShengError::InvalidArgument("afir: 脉冲响应为空".into()));
    }
    if ir.iter().any(|ch| ch.len() != len) {
        return Err(ShengError::InvalidArgument(
            "afir: 脉冲响应各声道长度不一致".into(),
        ));
    }

    let mut gains = Vec::with_capacity(ir.len());
    let mut delay = len;
    let mut nb_taps = 0;
    for (ch, time) in ir.iter().enumerate() {
        let mut gain = ir_gain(time, config.irnorm);
        if !gain.is_finite() {
            log::warn!("afir: 声道 {ch} 脉冲响应无法归一化, 增益按 1 处理");
            gain = 1.0;
        }
        gains.push(gain);
        let (ch_delay, ch_taps) = ir_delay(time, eps);
        delay = delay.min(ch_delay);
        nb_taps = nb_taps.max(ch_taps);
    }
    let nb_taps = nb_taps.max(1);

    if config.irlink {
        let min = gains.iter().copied().fold(f64::INFINITY, f64::min);
        gains.fill(min);
    }

    let keep = ((config.length * nb_taps as f64) as usize).max(1);
    let taps = ir
        .iter()
        .zip(&gains)
        .enumerate()
        .map(|(ch, (time, &ch_gain))| {
            let mut t = time[..nb_taps].to_vec();
            if keep < nb_taps {
                t[keep..].fill(0.0);
            }
            let gain = ch_gain * config.irgain;
            if gain != 1.0 {
                log::debug!("afir: 声道 {ch} 增益 {gain}");
                t.iter_mut().for_each(|v| *v *= gain);
            }
            t
        })
        .collect();

    log::debug!("afir: nb_taps={nb_taps}, delay={delay}");
    Ok(PreparedIr {
        taps,
        nb_taps,
        delay,
    })
}
