use crate::element::UIElement;
use tracing::{debug, info};

/// Click `element` if it is currently enabled and displayed.
///
/// Never fails: a stale element, a driver error or an element that is not
/// interactable all come back as `false`.
pub async fn try_click(element: &UIElement, description: &str) -> bool {
    match element.is_clickable().await {
        Ok(true) => {}
        Ok(false) => {
            debug!("{description}: not clickable");
            return false;
        }
        Err(e) => {
            debug!("{description}: state check failed: {e}");
            return false;
        }
    }

    match element.click().await {
        Ok(()) => {
            info!("Clicked {description}");
            true
        }
        Err(e) => {
            debug!("{description}: click failed: {e}");
            false
        }
    }
}
