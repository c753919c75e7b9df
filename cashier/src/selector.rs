use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locator strategy tags as they appear in flow files (`locatorType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocatorStrategy {
    Id,
    Xpath,
    AndroidUiautomator,
    AccessibilityId,
    ClassName,
    Name,
}

impl LocatorStrategy {
    pub const ALL: [LocatorStrategy; 6] = [
        LocatorStrategy::Id,
        LocatorStrategy::Xpath,
        LocatorStrategy::AndroidUiautomator,
        LocatorStrategy::AccessibilityId,
        LocatorStrategy::ClassName,
        LocatorStrategy::Name,
    ];

    /// Tag name used in flow files.
    pub fn tag(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "ID",
            LocatorStrategy::Xpath => "XPATH",
            LocatorStrategy::AndroidUiautomator => "ANDROID_UIAUTOMATOR",
            LocatorStrategy::AccessibilityId => "ACCESSIBILITY_ID",
            LocatorStrategy::ClassName => "CLASS_NAME",
            LocatorStrategy::Name => "NAME",
        }
    }

    /// The W3C / Appium `using` value sent to the server.
    pub fn using(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::AndroidUiautomator => "-android uiautomator",
            LocatorStrategy::AccessibilityId => "accessibility id",
            LocatorStrategy::ClassName => "class name",
            LocatorStrategy::Name => "name",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LocatorStrategy {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LocatorStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.tag().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                AutomationError::InvalidSelector(format!(
                    "Unknown locator type \"{s}\". Expected one of: ID, XPATH, ANDROID_UIAUTOMATOR, ACCESSIBILITY_ID, CLASS_NAME, NAME"
                ))
            })
    }
}

/// Represents ways to locate an element on the device screen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by resource id (e.g. `com.tencent.mm:id/gam`)
    Id(String),
    /// Select using an XPath query over the view hierarchy
    XPath(String),
    /// Select using a `UiSelector` expression
    UiAutomator(String),
    /// Select by content description
    AccessibilityId(String),
    /// Select by widget class name
    ClassName(String),
    /// Select by name attribute
    Name(String),
}

impl Selector {
    pub fn new(strategy: LocatorStrategy, value: impl Into<String>) -> Self {
        let value = value.into();
        match strategy {
            LocatorStrategy::Id => Selector::Id(value),
            LocatorStrategy::Xpath => Selector::XPath(value),
            LocatorStrategy::AndroidUiautomator => Selector::UiAutomator(value),
            LocatorStrategy::AccessibilityId => Selector::AccessibilityId(value),
            LocatorStrategy::ClassName => Selector::ClassName(value),
            LocatorStrategy::Name => Selector::Name(value),
        }
    }

    pub fn strategy(&self) -> LocatorStrategy {
        match self {
            Selector::Id(_) => LocatorStrategy::Id,
            Selector::XPath(_) => LocatorStrategy::Xpath,
            Selector::UiAutomator(_) => LocatorStrategy::AndroidUiautomator,
            Selector::AccessibilityId(_) => LocatorStrategy::AccessibilityId,
            Selector::ClassName(_) => LocatorStrategy::ClassName,
            Selector::Name(_) => LocatorStrategy::Name,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Selector::Id(v)
            | Selector::XPath(v)
            | Selector::UiAutomator(v)
            | Selector::AccessibilityId(v)
            | Selector::ClassName(v)
            | Selector::Name(v) => v,
        }
    }

    /// `(using, value)` pair for a W3C find-element request.
    pub fn to_webdriver(&self) -> (&'static str, &str) {
        (self.strategy().using(), self.value())
    }

    /// Elements whose visible text equals `text`.
    pub fn text(text: &str) -> Self {
        Selector::UiAutomator(format!(
            "new UiSelector().text(\"{}\")",
            escape_java(text)
        ))
    }

    /// Elements whose visible text contains `text`.
    pub fn text_contains(text: &str) -> Self {
        Selector::UiAutomator(format!(
            "new UiSelector().textContains(\"{}\")",
            escape_java(text)
        ))
    }

    /// Widgets of `class_name` whose content description equals `description`.
    pub fn class_with_description(class_name: &str, description: &str) -> Self {
        Selector::UiAutomator(format!(
            "new UiSelector().className(\"{}\").description(\"{}\")",
            escape_java(class_name),
            escape_java(description)
        ))
    }

    /// Elements whose resource id contains `fragment`.
    pub fn resource_id_contains(fragment: &str) -> Self {
        Selector::XPath(format!(
            "//*[contains(@resource-id, {})]",
            xpath_literal(fragment)
        ))
    }

    /// Clickable elements that carry no visible text.
    pub fn clickable_without_text() -> Self {
        Selector::XPath("//*[@clickable='true' and string-length(@text)=0]".to_string())
    }

    /// Dialog and alert containers.
    pub fn dialog_containers() -> Self {
        Selector::XPath(
            "//*[contains(@class, 'Dialog') or contains(@class, 'AlertDialog')]".to_string(),
        )
    }

    /// Button descendants, relative to a scoping element.
    pub fn descendant_buttons() -> Self {
        Selector::XPath(".//android.widget.Button".to_string())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

fn escape_java(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// XPath 1.0 has no escape sequences, so quotes are handled with concat().
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_tags_parse_case_insensitively() {
        assert_eq!(
            "ANDROID_UIAUTOMATOR".parse::<LocatorStrategy>().unwrap(),
            LocatorStrategy::AndroidUiautomator
        );
        assert_eq!("xpath".parse::<LocatorStrategy>().unwrap(), LocatorStrategy::Xpath);
        assert_eq!(" ID ".parse::<LocatorStrategy>().unwrap(), LocatorStrategy::Id);
    }

    #[test]
    fn test_unknown_strategy_is_invalid_selector() {
        match "CSS_MAGIC".parse::<LocatorStrategy>() {
            Err(AutomationError::InvalidSelector(msg)) => assert!(msg.contains("CSS_MAGIC")),
            other => panic!("expected InvalidSelector, got {other:?}"),
        }
    }

    #[test]
    fn test_webdriver_mapping() {
        let selector = Selector::new(LocatorStrategy::AccessibilityId, "关闭");
        assert_eq!(selector.to_webdriver(), ("accessibility id", "关闭"));
        assert_eq!(
            Selector::new(LocatorStrategy::AndroidUiautomator, "x").to_webdriver().0,
            "-android uiautomator"
        );
    }

    #[test]
    fn test_popup_selector_builders() {
        assert_eq!(
            Selector::text("确定").value(),
            "new UiSelector().text(\"确定\")"
        );
        assert_eq!(
            Selector::class_with_description("android.widget.ImageView", "关闭").value(),
            "new UiSelector().className(\"android.widget.ImageView\").description(\"关闭\")"
        );
        assert_eq!(
            Selector::resource_id_contains("close").value(),
            "//*[contains(@resource-id, 'close')]"
        );
    }

    #[test]
    fn test_quotes_are_escaped() {
        assert_eq!(
            Selector::text("say \"hi\"").value(),
            "new UiSelector().text(\"say \\\"hi\\\"\")"
        );
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal("a'b\"c"), "concat('a', \"'\", 'b\"c')");
    }
}
