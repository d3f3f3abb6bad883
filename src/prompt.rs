//! 操作者交互模块
//!
//! 修复流程在工作线程中执行，语言询问通过通道交给持有终端的线程回答。
//! 另一端已关闭或超时时采用默认值，询问不会让某本书永远挂起。

use crate::fix::language::{LanguageQuery, LanguageResolver};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, warn};

/// 一次等待回答的语言询问
#[derive(Debug)]
pub struct LanguageRequest {
    pub query: LanguageQuery,
    reply: Sender<Option<String>>,
}

impl LanguageRequest {
    /// 回答询问，None表示采用默认值
    pub fn answer(self, answer: Option<String>) {
        if self.reply.send(answer).is_err() {
            debug!("《{}》的语言询问已不再等待回答", self.query.book);
        }
    }
}

/// 通过通道转发询问的 [`LanguageResolver`]
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    requests: Sender<LanguageRequest>,
    timeout: Option<Duration>,
}

/// 创建询问通道
///
/// # 参数
/// * `timeout` - 等待回答的最长时间，None表示一直等待
///
/// # 返回值
/// * 交给修复流程的解析器，以及由交互线程读取的询问接收端
pub fn channel(timeout: Option<Duration>) -> (ChannelResolver, Receiver<LanguageRequest>) {
    let (requests, receiver) = mpsc::channel();
    (ChannelResolver { requests, timeout }, receiver)
}

impl LanguageResolver for ChannelResolver {
    fn resolve(&self, query: &LanguageQuery) -> Option<String> {
        let (reply, response) = mpsc::channel();
        let request = LanguageRequest {
            query: query.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            debug!("没有交互端，《{}》采用默认语言 {}", query.book, query.default);
            return None;
        }

        match self.timeout {
            Some(timeout) => match response.recv_timeout(timeout) {
                Ok(answer) => answer,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("等待语言回答超时，《{}》采用默认语言 {}", query.book, query.default);
                    None
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => response.recv().ok().flatten(),
        }
    }
}

/// 逐个回答询问，直到所有解析器都被丢弃
///
/// 每次询问向 `output` 写出提示，从 `input` 读取一行作为回答；空行表示采用默认值。
/// 输入结束后剩余的询问全部采用默认值。
pub fn serve<R: BufRead, W: Write>(
    requests: &Receiver<LanguageRequest>,
    mut input: R,
    mut output: W,
) -> io::Result<usize> {
    let mut served = 0;
    let mut input_closed = false;

    for request in requests.iter() {
        if input_closed {
            request.answer(None);
            continue;
        }

        write!(output, "🌐 {}: ", request.query.prompt())?;
        output.flush()?;

        let mut line = String::new();
        let answer = if input.read_line(&mut line)? == 0 {
            input_closed = true;
            writeln!(output)?;
            None
        } else {
            Some(line.trim().to_string()).filter(|answer| !answer.is_empty())
        };
        request.answer(answer);
        served += 1;
    }
    Ok(served)
}
