//! 统一错误类型定义.
//!
//! 所有 Sheng crate 共用的错误类型. 配置期错误 (系数格式、零极点数量、
//! 处理模式组合) 向上传播并终止滤镜初始化; 运行期的数值异常与削波
//! 只在本地恢复, 不会产生错误.

use thiserror::Error;

/// Sheng 统一错误类型
#[derive(Debug, Error)]
pub enum ShengError {
    /// 无效参数 (配置字符串格式错误、长度不匹配等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作 (处理模式与系数格式组合不支持等)
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 无效数据 (超出范围的边信息等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的滤镜
    #[error("未找到滤镜: {0}")]
    FilterNotFound(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Sheng 统一 Result 类型
pub type ShengResult<T> = Result<T, ShengError>;

/// 分配一个长度为 `len` 的零值缓冲区.
///
/// 分配失败时返回 [`ShengError::OutOfMemory`] 而不是直接中止进程,
/// 只应在配置阶段调用.
pub fn alloc_zeroed<T: Clone + Default>(len: usize, what: &str) -> ShengResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| ShengError::OutOfMemory(format!("{what}: {len} 个元素, {e}")))?;
    buf.resize(len, T::default());
    Ok(buf)
}
