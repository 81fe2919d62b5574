/// 每级所需经验值：level = floor(xp / XP_PER_LEVEL) + 1
pub const XP_PER_LEVEL: u64 = 100;

/// 默认最大生命值
pub const DEFAULT_MAX_HEARTS: u32 = 5;

/// 生命值恢复周期（分钟）
pub const DEFAULT_HEART_REGEN_MINUTES: i64 = 5;

/// 每日经验目标
pub const DEFAULT_DAILY_GOAL_XP: u64 = 20;

/// 达成每日目标的额外奖励
pub const DAILY_GOAL_BONUS_XP: u64 = 10;

/// 每答对一题立即获得的经验
pub const XP_PER_CORRECT_ANSWER: u64 = 2;

/// 全对奖励
pub const PERFECT_LESSON_BONUS_XP: u64 = 5;

/// 通过课程所需正确率（百分比）
pub const PASS_THRESHOLD_PERCENT: usize = 70;

/// 排行榜默认返回条数
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;

/// 排行榜最大返回条数
pub const MAX_LEADERBOARD_LIMIT: usize = 200;

/// 未设置 id 时本地学习者在排行榜中的标识
pub const LOCAL_LEARNER_ID: &str = "local";

/// 未设置昵称时的默认显示名
pub const DEFAULT_LEARNER_NAME: &str = "Learner";

/// 进度事件广播通道容量
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
