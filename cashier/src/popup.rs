//! Popup detection and dismissal
//!
//! One call to [`PopupHandler::dismiss_one`] is a *round*: detection tiers
//! run from the most precise (explicit button text) to the riskiest (a blind
//! back press) and the first successful click ends the round. Lookup failures
//! inside a tier are logged and skipped, so a flaky screen never aborts the
//! sweep.

use crate::config::PopupSettings;
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::probe::try_click;
use crate::selector::Selector;
use crate::Device;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Button captions that close, accept or defer a dialog, in priority order.
pub const DISMISS_TEXTS: &[&str] = &[
    // confirmations
    "确定", "确认", "好的", "知道了", "我知道了", "明白了", "同意", "允许", "接受", "继续",
    // onboarding
    "下一步", "立即体验", "开始使用", "马上体验", "立即开始", "去设置",
    // cancellations
    "取消", "关闭", "跳过", "稍后", "暂不", "不了", "以后再说", "暂时不用", "下次再说", "忽略",
    "不再提示", "我再想想",
    // update prompts
    "暂不更新", "稍后更新", "取消更新", "忽略更新", "下次更新",
    // permission prompts
    "始终允许", "仅在使用时允许", "拒绝", "禁止", "不允许",
    // notifications
    "不开启", "暂不开启", "关闭通知", "稍后设置",
    // ads
    "跳过广告", "关闭广告", "不感兴趣",
];

/// Resource-id fragments used by common close/confirm controls.
pub const DISMISS_ID_FRAGMENTS: &[&str] = &[
    "close",
    "cancel",
    "dismiss",
    "skip",
    "later",
    "ok",
    "confirm",
    "btn_close",
    "btn_cancel",
    "btn_dismiss",
    "btn_skip",
    "btn_ok",
    "iv_close",
    "iv_cancel",
    "img_close",
    "image_close",
    "update_cancel",
    "dialog_cancel",
    "popup_close",
    "modal_close",
    "negative",
    "positive",
    "neutral",
];

/// Widget classes paired with the content descriptions that mark them as
/// dismiss controls.
pub const DISMISS_CLASS_LABELS: &[(&str, &[&str])] = &[
    ("android.widget.ImageView", &["关闭", "取消", "返回"]),
    ("android.widget.ImageButton", &["关闭", "取消", "返回"]),
    (
        "android.widget.Button",
        &["确定", "取消", "关闭", "跳过", "同意", "允许"],
    ),
    (
        "android.widget.TextView",
        &["确定", "取消", "关闭", "跳过", "同意", "允许"],
    ),
];

/// Words that identify a dismiss button inside a dialog container.
pub const DIALOG_BUTTON_WORDS: &[&str] = &["取消", "关闭", "跳过", "稍后"];

/// The reduced vocabulary of [`PopupHandler::quick_popup_check`].
pub const QUICK_CHECK_TEXTS: &[&str] = &[
    "确定", "取消", "关闭", "跳过", "知道了", "同意",
];

/// Detection tier, in the order a round tries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupTier {
    Text,
    ResourceId,
    ClassLabel,
    Geometry,
    Dialog,
    BackButton,
}

impl fmt::Display for PopupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PopupTier::Text => "text",
            PopupTier::ResourceId => "resource-id",
            PopupTier::ClassLabel => "class+label",
            PopupTier::Geometry => "geometry",
            PopupTier::Dialog => "dialog",
            PopupTier::BackButton => "back-button",
        };
        f.write_str(name)
    }
}

/// An element one of the tiers believes dismisses an overlay.
#[derive(Debug, Clone)]
pub struct PopupCandidate {
    pub element: UIElement,
    pub tier: PopupTier,
}

/// Something a round did to the screen.
#[derive(Debug, Clone, Serialize)]
pub struct Dismissal {
    pub tier: PopupTier,
    pub description: String,
}

/// Result of one round
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Dismissed(Dismissal),
    /// No tier found anything and the back fallback is disabled.
    Clean,
    /// The round could not complete; counts as nothing dismissed.
    Failed(String),
}

/// Report of a multi-round sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopupSweep {
    pub rounds: usize,
    pub dismissals: Vec<Dismissal>,
    pub errors: Vec<String>,
}

impl PopupSweep {
    pub fn dismissed_any(&self) -> bool {
        !self.dismissals.is_empty()
    }
}

/// Finds and closes unexpected overlays on the current screen
#[derive(Clone)]
pub struct PopupHandler {
    device: Device,
    settings: PopupSettings,
}

impl PopupHandler {
    pub fn new(device: Device, settings: PopupSettings) -> Self {
        Self { device, settings }
    }

    /// Run up to `max_rounds` rounds, stopping at the first clean screen.
    pub async fn handle_popups(&self, max_rounds: usize) -> PopupSweep {
        let mut sweep = PopupSweep::default();

        for round in 1..=max_rounds {
            sweep.rounds = round;
            match self.dismiss_one(&mut sweep.errors).await {
                RoundOutcome::Dismissed(dismissal) => {
                    info!(
                        "Popup round {round}/{max_rounds}: dismissed via {} ({})",
                        dismissal.tier, dismissal.description
                    );
                    sweep.dismissals.push(dismissal);
                }
                RoundOutcome::Clean => {
                    debug!("Popup round {round}/{max_rounds}: screen clean");
                    break;
                }
                RoundOutcome::Failed(reason) => {
                    warn!("Popup round {round}/{max_rounds} failed: {reason}");
                    sweep.errors.push(reason);
                }
            }
        }

        sweep
    }

    /// One round: first tier to dismiss something wins.
    pub async fn dismiss_one(&self, errors: &mut Vec<String>) -> RoundOutcome {
        let mut scan = Scan {
            device: &self.device,
            errors,
        };

        let found = 'tiers: {
            if let Some(d) = scan.text_tier().await {
                break 'tiers Some(d);
            }
            if let Some(d) = scan.resource_id_tier().await {
                break 'tiers Some(d);
            }
            if let Some(d) = scan.class_label_tier().await {
                break 'tiers Some(d);
            }
            let (max_size, min_x) = (self.settings.geometry_max_size, self.settings.geometry_min_x);
            if let Some(d) = scan.geometry_tier(max_size, min_x).await {
                break 'tiers Some(d);
            }
            scan.dialog_tier().await
        };

        if let Some(dismissal) = found {
            self.settle(self.settings.dismiss_settle_ms).await;
            return RoundOutcome::Dismissed(dismissal);
        }

        if !self.settings.back_fallback {
            return RoundOutcome::Clean;
        }

        // Counted as a dismissal whether or not an overlay was actually open.
        match self.device.back().await {
            Ok(()) => {
                self.settle(self.settings.back_settle_ms).await;
                RoundOutcome::Dismissed(Dismissal {
                    tier: PopupTier::BackButton,
                    description: "back navigation".to_string(),
                })
            }
            Err(e) => RoundOutcome::Failed(format!("back navigation failed: {e}")),
        }
    }

    /// Single pass over a short caption list; exact matches only.
    pub async fn quick_popup_check(&self) -> bool {
        let mut errors = Vec::new();
        let mut scan = Scan {
            device: &self.device,
            errors: &mut errors,
        };

        for text in QUICK_CHECK_TEXTS {
            let description = format!("quick check '{text}'");
            if scan
                .click_first(&Selector::text(text), PopupTier::Text, &description)
                .await
            {
                self.settle(self.settings.quick_settle_ms).await;
                return true;
            }
        }
        false
    }

    async fn settle(&self, millis: u64) {
        if millis > 0 {
            sleep(Duration::from_millis(millis)).await;
        }
    }
}

/// Per-round lookup state; collects lookup errors instead of failing.
struct Scan<'a> {
    device: &'a Device,
    errors: &'a mut Vec<String>,
}

impl Scan<'_> {
    async fn find(&mut self, selector: &Selector) -> Vec<UIElement> {
        match self.device.find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                self.record(selector, e);
                Vec::new()
            }
        }
    }

    fn record(&mut self, selector: &Selector, error: AutomationError) {
        debug!("Popup lookup {selector} failed: {error}");
        self.errors.push(format!("{selector}: {error}"));
    }

    async fn first_candidate(
        &mut self,
        selector: &Selector,
        tier: PopupTier,
    ) -> Option<PopupCandidate> {
        self.find(selector)
            .await
            .into_iter()
            .next()
            .map(|element| PopupCandidate { element, tier })
    }

    async fn click_first(
        &mut self,
        selector: &Selector,
        tier: PopupTier,
        description: &str,
    ) -> bool {
        match self.first_candidate(selector, tier).await {
            Some(candidate) => try_click(&candidate.element, description).await,
            None => false,
        }
    }

    async fn text_tier(&mut self) -> Option<Dismissal> {
        for text in DISMISS_TEXTS {
            let exact = format!("text '{text}'");
            if self
                .click_first(&Selector::text(text), PopupTier::Text, &exact)
                .await
            {
                return Some(dismissal(PopupTier::Text, exact));
            }
            let partial = format!("text containing '{text}'");
            if self
                .click_first(&Selector::text_contains(text), PopupTier::Text, &partial)
                .await
            {
                return Some(dismissal(PopupTier::Text, partial));
            }
        }
        None
    }

    async fn resource_id_tier(&mut self) -> Option<Dismissal> {
        for fragment in DISMISS_ID_FRAGMENTS {
            let description = format!("resource-id containing '{fragment}'");
            if self
                .click_first(
                    &Selector::resource_id_contains(fragment),
                    PopupTier::ResourceId,
                    &description,
                )
                .await
            {
                return Some(dismissal(PopupTier::ResourceId, description));
            }
        }
        None
    }

    async fn class_label_tier(&mut self) -> Option<Dismissal> {
        for (class_name, labels) in DISMISS_CLASS_LABELS {
            for label in labels.iter() {
                let description = format!("{class_name} labelled '{label}'");
                if self
                    .click_first(
                        &Selector::class_with_description(class_name, label),
                        PopupTier::ClassLabel,
                        &description,
                    )
                    .await
                {
                    return Some(dismissal(PopupTier::ClassLabel, description));
                }
            }
        }
        None
    }

    /// Small unlabeled clickable controls toward the right edge.
    async fn geometry_tier(&mut self, max_size: f64, min_x: f64) -> Option<Dismissal> {
        let selector = Selector::clickable_without_text();
        for element in self.find(&selector).await {
            let bounds = match element.bounds().await {
                Ok(bounds) => bounds,
                Err(e) => {
                    self.record(&selector, e);
                    continue;
                }
            };
            if bounds.width > max_size || bounds.height > max_size || bounds.x <= min_x {
                continue;
            }
            let description = format!(
                "unlabeled control at ({}, {}) sized {}x{}",
                bounds.x, bounds.y, bounds.width, bounds.height
            );
            if try_click(&element, &description).await {
                return Some(dismissal(PopupTier::Geometry, description));
            }
        }
        None
    }

    async fn dialog_tier(&mut self) -> Option<Dismissal> {
        let buttons_selector = Selector::descendant_buttons();
        for container in self.find(&Selector::dialog_containers()).await {
            let buttons = match container.find_elements(&buttons_selector).await {
                Ok(buttons) => buttons,
                Err(e) => {
                    self.record(&buttons_selector, e);
                    continue;
                }
            };
            for button in buttons {
                let text = match button.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        self.record(&buttons_selector, e);
                        continue;
                    }
                };
                if !DIALOG_BUTTON_WORDS.iter().any(|word| text.contains(word)) {
                    continue;
                }
                let description = format!("dialog button '{text}'");
                if try_click(&button, &description).await {
                    return Some(dismissal(PopupTier::Dialog, description));
                }
            }
        }
        None
    }
}

fn dismissal(tier: PopupTier, description: String) -> Dismissal {
    Dismissal { tier, description }
}
