//! 变换原语.
//!
//! 对标 FFmpeg 的 `libavutil/tx`: 实数 FFT (RDFT) 与 MDCT.
//! 变换对象在配置阶段创建, 内部持有全部暂存缓冲区, 处理路径不再分配.

mod mdct;
mod rdft;

pub use mdct::Mdct;
pub use rdft::Rdft;
