//! AAC 频域 DSP 策略对象.
//!
//! 对标 FFmpeg 的 `AACDecDSP`: 精度与归一化约定在配置阶段确定,
//! 之后每帧只调用已解析好的函数, 不再按格式分支.

use rayon::prelude::*;
use sheng_core::float_dsp::{self, Real, cst};
use sheng_core::window_func::{aac_long_window, aac_short_window};
use sheng_core::{ShengError, ShengResult, WindowShape};

use super::band::{ChannelPair, FRAME_LEN, IcsInfo, SingleChannelElement, WindowSequence};
use super::dequant::{FloatSf, dequant_scalefactors};
use super::ltp::{LtpState, MAX_LTP_LONG_SFB};
use super::stereo::{ButterflyFn, MsNormalization, MsSample, apply_intensity_stereo};
use super::tns::{TnsData, TnsMode, apply_tns};

/// AAC DSP 配置
#[derive(Debug, Clone, Copy)]
pub struct AacDspConfig {
    pub ms_normalization: MsNormalization,
    /// LTP 预测路径的 MDCT 缩放, 与合成端 IMDCT 的 1/1024 缩放配对
    pub ltp_mdct_scale: f64,
}

impl Default for AacDspConfig {
    fn default() -> Self {
        Self {
            ms_normalization: MsNormalization::Unity,
            ltp_mdct_scale: 1.0,
        }
    }
}

/// 已解析的 AAC 频域处理策略
pub struct AacDsp<T: Real + MsSample> {
    config: AacDspConfig,
    butterfly: ButterflyFn<T>,
    dequant: FloatSf<T>,
    /// 按窗形状索引: [sine, kbd]
    long_windows: [Vec<T>; 2],
    short_windows: [Vec<T>; 2],
}

fn shape_index(shape: WindowShape) -> usize {
    match shape {
        WindowShape::Sine => 0,
        WindowShape::Kbd => 1,
    }
}

fn to_real<T: Real>(w: &[f64]) -> Vec<T> {
    w.iter().map(|&v| cst(v)).collect()
}

impl<T: Real + MsSample> AacDsp<T> {
    /// 按配置创建
    pub fn new(config: AacDspConfig) -> Self {
        log::debug!(
            "AAC DSP 初始化: ms={:?}, ltp_mdct_scale={}",
            config.ms_normalization,
            config.ltp_mdct_scale
        );
        Self {
            config,
            butterfly: config.ms_normalization.resolve(),
            dequant: FloatSf::new(),
            long_windows: [
                to_real(aac_long_window(WindowShape::Sine)),
                to_real(aac_long_window(WindowShape::Kbd)),
            ],
            short_windows: [
                to_real(aac_short_window(WindowShape::Sine)),
                to_real(aac_short_window(WindowShape::Kbd)),
            ],
        }
    }

    /// 配置
    pub fn config(&self) -> &AacDspConfig {
        &self.config
    }

    /// 为一个声道创建 LTP 状态
    pub fn new_ltp_state(&self) -> ShengResult<LtpState<T>> {
        LtpState::new(self.config.ltp_mdct_scale)
    }

    fn long_window(&self, shape: WindowShape) -> &[T] {
        &self.long_windows[shape_index(shape)]
    }

    fn short_window(&self, shape: WindowShape) -> &[T] {
        &self.short_windows[shape_index(shape)]
    }

    /// 尺度因子反量化
    pub fn dequant_scalefactors(&self, sce: &mut SingleChannelElement<T>) -> ShengResult<()> {
        dequant_scalefactors(
            &self.dequant,
            &sce.ics,
            &sce.band_type,
            &sce.band_type_run_end,
            &sce.sfo,
            &mut sce.sf,
        )
    }

    /// M/S 立体声
    pub fn apply_mid_side_stereo(&self, cpe: &mut ChannelPair<T>) {
        super::stereo::apply_mid_side_stereo(cpe, self.butterfly);
    }

    /// 强度立体声
    pub fn apply_intensity_stereo(&self, cpe: &mut ChannelPair<T>) {
        apply_intensity_stereo(cpe);
    }

    /// TNS
    pub fn apply_tns(&self, coef: &mut [T], tns: &TnsData, ics: &IcsInfo, mode: TnsMode) {
        apply_tns(coef, tns, ics, mode);
    }

    /// 对预测时域信号加窗并做 MDCT, 结果写入 `state.pred_freq`
    fn windowing_and_mdct_ltp(&self, state: &mut LtpState<T>, ics: &IcsInfo) -> ShengResult<()> {
        let lwindow = self.long_window(ics.window_shape);
        let swindow = self.short_window(ics.window_shape);
        let lwindow_prev = self.long_window(ics.prev_window_shape);
        let swindow_prev = self.short_window(ics.prev_window_shape);
        let input = &mut state.pred_time;

        if ics.window_sequence != WindowSequence::LongStop {
            for (x, &w) in input[..1024].iter_mut().zip(lwindow_prev) {
                *x = *x * w;
            }
        } else {
            input[..448].fill(T::zero());
            for (x, &w) in input[448..576].iter_mut().zip(swindow_prev) {
                *x = *x * w;
            }
        }

        if ics.window_sequence != WindowSequence::LongStart {
            for (i, x) in input[1024..2048].iter_mut().enumerate() {
                *x = *x * lwindow[1023 - i];
            }
        } else {
            for (i, x) in input[1472..1600].iter_mut().enumerate() {
                *x = *x * swindow[127 - i];
            }
            input[1600..].fill(T::zero());
        }

        state.mdct.forward(&state.pred_time, &mut state.pred_freq)
    }

    /// 长时预测: 由历史预测当前帧频谱并叠加到使用的频带
    pub fn apply_ltp(
        &self,
        sce: &mut SingleChannelElement<T>,
        state: &mut LtpState<T>,
    ) -> ShengResult<()> {
        if sce.ics.is_eight_short() {
            return Ok(());
        }
        let ltp = &sce.ltp;
        if ltp.lag > 2048 {
            return Err(ShengError::InvalidData(format!(
                "AAC LTP 延迟越界: {}",
                ltp.lag
            )));
        }
        let num_samples = if ltp.lag < 1024 { ltp.lag + 1024 } else { 2048 };
        let coef = cst::<T>(ltp.coef);
        let src = 2048 - ltp.lag;
        float_dsp::vector_fmul_scalar(
            &mut state.pred_time[..num_samples],
            &state.history[src..src + num_samples],
            coef,
        );
        state.pred_time[num_samples..].fill(T::zero());

        self.windowing_and_mdct_ltp(state, &sce.ics)?;

        if sce.tns.present {
            apply_tns(&mut state.pred_freq, &sce.tns, &sce.ics, TnsMode::Analysis);
        }

        let offsets = &sce.ics.swb_offset;
        for sfb in 0..sce.ics.max_sfb.min(MAX_LTP_LONG_SFB) {
            if sce.ltp.used[sfb] {
                let range = offsets[sfb]..offsets[sfb + 1];
                for (c, &p) in sce.coeffs[range.clone()].iter_mut().zip(&state.pred_freq[range]) {
                    *c = *c + p;
                }
            }
        }
        Ok(())
    }

    /// 更新 LTP 历史.
    ///
    /// `imdct_out` 为本帧 IMDCT 输出 (至少 1024 点), `saved` 为短窗重叠
    /// 缓冲, `output` 为本帧 1024 点时域输出.
    pub fn update_ltp(
        &self,
        state: &mut LtpState<T>,
        ics: &IcsInfo,
        imdct_out: &[T],
        saved: &[T],
        output: &[T],
    ) -> ShengResult<()> {
        if imdct_out.len() < FRAME_LEN || saved.len() < 512 || output.len() < FRAME_LEN {
            return Err(ShengError::InvalidArgument(format!(
                "LTP 更新缓冲长度不足: imdct={}, saved={}, output={}",
                imdct_out.len(),
                saved.len(),
                output.len()
            )));
        }
        let lwindow = self.long_window(ics.window_shape);
        let swindow = self.short_window(ics.window_shape);
        let history = &mut state.history;

        history.copy_within(1024..2048, 0);
        history[1024..2048].copy_from_slice(&output[..1024]);

        let saved_ltp = &mut history[2048..3072];
        match ics.window_sequence {
            WindowSequence::EightShort | WindowSequence::LongStart => {
                if ics.window_sequence == WindowSequence::EightShort {
                    saved_ltp[..512].copy_from_slice(&saved[..512]);
                } else {
                    saved_ltp[..448].copy_from_slice(&imdct_out[512..960]);
                }
                saved_ltp[576..].fill(T::zero());
                for i in 0..64 {
                    saved_ltp[448 + i] = imdct_out[960 + i] * swindow[127 - i];
                    saved_ltp[512 + i] = imdct_out[1023 - i] * swindow[63 - i];
                }
            }
            WindowSequence::OnlyLong | WindowSequence::LongStop => {
                for i in 0..512 {
                    saved_ltp[i] = imdct_out[512 + i] * lwindow[1023 - i];
                    saved_ltp[512 + i] = imdct_out[1023 - i] * lwindow[511 - i];
                }
            }
        }
        Ok(())
    }

    /// 声道对的完整频域重建: 反量化、M/S、强度立体声, 再按声道并行做 LTP 与 TNS
    pub fn decode_channel_pair(
        &self,
        cpe: &mut ChannelPair<T>,
        ltp_states: &mut [LtpState<T>; 2],
    ) -> ShengResult<()> {
        for ch in &mut cpe.ch {
            self.dequant_scalefactors(ch)?;
        }
        if cpe.ms_present {
            self.apply_mid_side_stereo(cpe);
        }
        self.apply_intensity_stereo(cpe);

        cpe.ch[..]
            .par_iter_mut()
            .zip(ltp_states[..].par_iter_mut())
            .try_for_each(|(sce, state)| self.decode_channel_tail(sce, state))
    }

    /// 单声道的 LTP 与 TNS 合成
    pub fn decode_channel_tail(
        &self,
        sce: &mut SingleChannelElement<T>,
        state: &mut LtpState<T>,
    ) -> ShengResult<()> {
        if sce.ltp.present {
            self.apply_ltp(sce, state)?;
        }
        if sce.tns.present {
            apply_tns(&mut sce.coeffs, &sce.tns, &sce.ics, TnsMode::Synthesis);
        }
        Ok(())
    }
}
