//! 音频声道布局定义.
//!
//! 对标 FFmpeg 的 `AVChannelLayout` / `AV_CH_LAYOUT_*`.
//! 声道在帧中的顺序与掩码中置位的顺序一致 (低位在前).

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 声道位掩码, 每个位代表一个扬声器位置
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u64 {
        /// 前方左声道
        const FRONT_LEFT            = 1 << 0;
        /// 前方右声道
        const FRONT_RIGHT           = 1 << 1;
        /// 前方中央声道
        const FRONT_CENTER          = 1 << 2;
        /// 低频效果 (LFE / 重低音)
        const LOW_FREQUENCY         = 1 << 3;
        /// 后方左声道
        const BACK_LEFT             = 1 << 4;
        /// 后方右声道
        const BACK_RIGHT            = 1 << 5;
        /// 前方中左声道
        const FRONT_LEFT_OF_CENTER  = 1 << 6;
        /// 前方中右声道
        const FRONT_RIGHT_OF_CENTER = 1 << 7;
        /// 后方中央声道
        const BACK_CENTER           = 1 << 8;
        /// 侧方左声道
        const SIDE_LEFT             = 1 << 9;
        /// 侧方右声道
        const SIDE_RIGHT            = 1 << 10;
        /// 顶部中央
        const TOP_CENTER            = 1 << 11;
        /// 顶部前左
        const TOP_FRONT_LEFT        = 1 << 12;
        /// 顶部前中
        const TOP_FRONT_CENTER      = 1 << 13;
        /// 顶部前右
        const TOP_FRONT_RIGHT       = 1 << 14;
        /// 顶部后左
        const TOP_BACK_LEFT         = 1 << 15;
        /// 顶部后中
        const TOP_BACK_CENTER       = 1 << 16;
        /// 顶部后右
        const TOP_BACK_RIGHT        = 1 << 17;
        /// 第二低频声道
        const LOW_FREQUENCY_2       = 1 << 35;
        /// 顶部侧左
        const TOP_SIDE_LEFT         = 1 << 36;
        /// 顶部侧右
        const TOP_SIDE_RIGHT        = 1 << 37;
        /// 底部前中
        const BOTTOM_FRONT_CENTER   = 1 << 38;
        /// 底部前左
        const BOTTOM_FRONT_LEFT     = 1 << 39;
        /// 底部前右
        const BOTTOM_FRONT_RIGHT    = 1 << 40;
    }
}

/// 单个扬声器位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    LowFrequency,
    BackLeft,
    BackRight,
    FrontLeftOfCenter,
    FrontRightOfCenter,
    BackCenter,
    SideLeft,
    SideRight,
    TopCenter,
    TopFrontLeft,
    TopFrontCenter,
    TopFrontRight,
    TopBackLeft,
    TopBackCenter,
    TopBackRight,
    LowFrequency2,
    TopSideLeft,
    TopSideRight,
    BottomFrontCenter,
    BottomFrontLeft,
    BottomFrontRight,
}

impl Channel {
    /// 由掩码位序号构造
    pub fn from_bit(bit: u32) -> Option<Self> {
        let ch = match bit {
            0 => Self::FrontLeft,
            1 => Self::FrontRight,
            2 => Self::FrontCenter,
            3 => Self::LowFrequency,
            4 => Self::BackLeft,
            5 => Self::BackRight,
            6 => Self::FrontLeftOfCenter,
            7 => Self::FrontRightOfCenter,
            8 => Self::BackCenter,
            9 => Self::SideLeft,
            10 => Self::SideRight,
            11 => Self::TopCenter,
            12 => Self::TopFrontLeft,
            13 => Self::TopFrontCenter,
            14 => Self::TopFrontRight,
            15 => Self::TopBackLeft,
            16 => Self::TopBackCenter,
            17 => Self::TopBackRight,
            35 => Self::LowFrequency2,
            36 => Self::TopSideLeft,
            37 => Self::TopSideRight,
            38 => Self::BottomFrontCenter,
            39 => Self::BottomFrontLeft,
            40 => Self::BottomFrontRight,
            _ => return None,
        };
        Some(ch)
    }

    /// 对应的掩码位
    pub fn mask(self) -> ChannelMask {
        let bit = match self {
            Self::FrontLeft => 0,
            Self::FrontRight => 1,
            Self::FrontCenter => 2,
            Self::LowFrequency => 3,
            Self::BackLeft => 4,
            Self::BackRight => 5,
            Self::FrontLeftOfCenter => 6,
            Self::FrontRightOfCenter => 7,
            Self::BackCenter => 8,
            Self::SideLeft => 9,
            Self::SideRight => 10,
            Self::TopCenter => 11,
            Self::TopFrontLeft => 12,
            Self::TopFrontCenter => 13,
            Self::TopFrontRight => 14,
            Self::TopBackLeft => 15,
            Self::TopBackCenter => 16,
            Self::TopBackRight => 17,
            Self::LowFrequency2 => 35,
            Self::TopSideLeft => 36,
            Self::TopSideRight => 37,
            Self::BottomFrontCenter => 38,
            Self::BottomFrontLeft => 39,
            Self::BottomFrontRight => 40,
        };
        ChannelMask::from_bits_retain(1u64 << bit)
    }

    /// 是否为低频声道
    pub fn is_lfe(self) -> bool {
        matches!(self, Self::LowFrequency | Self::LowFrequency2)
    }
}

/// 声道布局
///
/// 描述音频流中声道的数量和排列方式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    /// 声道数量
    pub channels: u32,
    /// 声道位掩码 (标准布局使用)
    pub mask: ChannelMask,
}

impl ChannelLayout {
    /// 单声道
    pub const MONO: Self = Self::from_mask(ChannelMask::FRONT_CENTER);

    /// 立体声 (左右)
    pub const STEREO: Self =
        Self::from_mask(ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT));

    /// 2.1 (左右 + 低频)
    pub const LAYOUT_2_1: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::LOW_FREQUENCY),
    );

    /// 3.0 (左右 + 中置)
    pub const SURROUND: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER),
    );

    /// 3.1 (左右 + 中置 + 低频)
    pub const LAYOUT_3_1: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::LOW_FREQUENCY),
    );

    /// 4.0 (左右 + 中置 + 后中)
    pub const LAYOUT_4_0: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::BACK_CENTER),
    );

    /// 5.0 (侧环绕)
    pub const LAYOUT_5_0: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::SIDE_LEFT)
            .union(ChannelMask::SIDE_RIGHT),
    );

    /// 5.1 环绕声 (侧环绕)
    pub const SURROUND_5_1: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::LOW_FREQUENCY)
            .union(ChannelMask::SIDE_LEFT)
            .union(ChannelMask::SIDE_RIGHT),
    );

    /// 7.1 环绕声
    pub const SURROUND_7_1: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::LOW_FREQUENCY)
            .union(ChannelMask::BACK_LEFT)
            .union(ChannelMask::BACK_RIGHT)
            .union(ChannelMask::SIDE_LEFT)
            .union(ChannelMask::SIDE_RIGHT),
    );

    /// 由位掩码创建布局, 声道数等于置位数
    pub const fn from_mask(mask: ChannelMask) -> Self {
        Self {
            channels: mask.bits().count_ones(),
            mask,
        }
    }

    /// 根据声道数创建默认布局
    pub fn from_channels(channels: u32) -> Self {
        match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self::SURROUND,
            4 => Self::LAYOUT_4_0,
            5 => Self::LAYOUT_5_0,
            6 => Self::SURROUND_5_1,
            8 => Self::SURROUND_7_1,
            n => Self {
                channels: n,
                mask: ChannelMask::empty(),
            },
        }
    }

    /// 由名称解析布局, 接受 `mono`/`stereo`/`2.1`/`3.0`/`3.1`/`4.0`/`5.0`/`5.1`/`7.1`
    pub fn from_name(name: &str) -> Option<Self> {
        let layout = match name.trim() {
            "mono" => Self::MONO,
            "stereo" => Self::STEREO,
            "2.1" => Self::LAYOUT_2_1,
            "3.0" | "surround" => Self::SURROUND,
            "3.1" => Self::LAYOUT_3_1,
            "4.0" => Self::LAYOUT_4_0,
            "5.0" => Self::LAYOUT_5_0,
            "5.1" => Self::SURROUND_5_1,
            "7.1" => Self::SURROUND_7_1,
            _ => return None,
        };
        Some(layout)
    }

    /// 第 `idx` 个声道的扬声器位置, 无掩码或越界时返回 None
    pub fn channel_at(&self, idx: usize) -> Option<Channel> {
        let mut bits = self.mask.bits();
        let mut seen = 0;
        while bits != 0 {
            let bit = bits.trailing_zeros();
            if seen == idx {
                return Channel::from_bit(bit);
            }
            seen += 1;
            bits &= bits - 1;
        }
        None
    }

    /// 指定扬声器位置在布局中的序号
    pub fn index_of(&self, channel: Channel) -> Option<usize> {
        let bit = channel.mask();
        if !self.mask.contains(bit) {
            return None;
        }
        let below = bit.bits() - 1;
        Some((self.mask.bits() & below).count_ones() as usize)
    }

    /// 布局是否包含指定扬声器位置
    pub fn contains(&self, channel: Channel) -> bool {
        self.mask.contains(channel.mask())
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MONO => write!(f, "mono"),
            Self::STEREO => write!(f, "stereo"),
            Self::LAYOUT_2_1 => write!(f, "2.1"),
            Self::SURROUND => write!(f, "3.0"),
            Self::LAYOUT_3_1 => write!(f, "3.1"),
            Self::LAYOUT_4_0 => write!(f, "4.0"),
            Self::LAYOUT_5_0 => write!(f, "5.0"),
            Self::SURROUND_5_1 => write!(f, "5.1"),
            Self::SURROUND_7_1 => write!(f, "7.1"),
            _ => write!(f, "{}ch", self.channels),
        }
    }
}
