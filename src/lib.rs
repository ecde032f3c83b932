//! Bee Relay - 多渠道对话中枢
//!
//! 把聊天渠道的消息桥接到大模型后端，负责会话状态、Agent 绑定与多模型容错。
//!
//! 模块划分：
//! - **agent**: 编排主循环、/agent 命令、上下文构建
//! - **agents**: Agent Profile、路由规则、配置快照
//! - **bus**: 入站 / 出站消息总线
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、重试退避、轮次状态、会话锁、并发许可、优雅关闭
//! - **llm**: Provider 抽象与实现（OpenAI 兼容 / 路由 / 脚本化）与候选回退
//! - **memory**: 对话消息类型
//! - **session**: 会话实体、并发会话存储与文件持久化
//! - **tools**: 工具箱与执行器

pub mod agent;
pub mod agents;
pub mod bus;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod session;
pub mod tools;
