use std::panic::AssertUnwindSafe;

use chatbot_core::{Conversation, Exchange};
use futures_util::FutureExt;
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub conversation: Conversation,

    // Chat pane scrolling (updated during render)
    pub chat_scroll: u16,
    pub max_chat_scroll: u16,
    pub chat_height: u16,
    pub follow_bottom: bool,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    exchange_task: Option<JoinHandle<()>>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(conversation: Conversation, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation,

            chat_scroll: 0,
            max_chat_scroll: 0,
            chat_height: 0,
            follow_bottom: true,
            chat_area: None,

            animation_frame: 0,

            exchange_task: None,
            events,
        }
    }

    /// Submit the pending input, if the conversation accepts it
    pub fn submit(&mut self) {
        if let Some(exchange) = self.conversation.begin_from_input() {
            self.follow_bottom = true;
            self.animation_frame = 0;
            self.spawn_exchange(exchange);
        }
    }

    /// Run the exchange in the background and report back through the event channel
    fn spawn_exchange(&mut self, exchange: Exchange) {
        let tx = self.events.clone();
        self.exchange_task = Some(tokio::spawn(async move {
            let event = match AssertUnwindSafe(exchange.send()).catch_unwind().await {
                Ok(outcome) => AppEvent::Reply(outcome),
                Err(_) => AppEvent::ReplyLost("exchange panicked".to_string()),
            };
            let _ = tx.send(event);
        }));
    }

    pub fn on_reply(&mut self, outcome: Result<String, chatbot_core::CompletionError>) {
        self.exchange_task = None;
        self.conversation.resolve(outcome);
        self.follow_bottom = true;
    }

    pub fn on_reply_lost(&mut self, reason: &str) {
        self.exchange_task = None;
        self.conversation.abandon(reason);
        self.follow_bottom = true;
    }

    pub fn quit(&mut self) {
        if let Some(task) = self.exchange_task.take() {
            task.abort();
        }
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_awaiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_chat_scroll);
        self.follow_bottom = self.chat_scroll >= self.max_chat_scroll;
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll;
        self.follow_bottom = true;
    }

    /// Record the chat pane geometry from the last render and clamp scrolling to it
    pub fn update_chat_layout(&mut self, area: Rect, inner_height: u16, total_lines: u16) {
        self.chat_area = Some(area);
        self.chat_height = inner_height;
        self.max_chat_scroll = total_lines.saturating_sub(inner_height);
        if self.follow_bottom {
            self.chat_scroll = self.max_chat_scroll;
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_chat_scroll);
        }
    }
}
