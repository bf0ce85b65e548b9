use crate::dom::Document;
use crate::types::PageState;

/// Where pages tend to show an account balance.
pub const BALANCE_SELECTOR: &str = "[data-balance], .balance, .BalanceAmount";

/// Url, title, a fresh timestamp and, best effort, the balance hint.
pub fn read_state<D: Document + ?Sized>(doc: &D) -> PageState {
    let hint_balance = doc
        .query_selector(BALANCE_SELECTOR)
        .ok()
        .flatten()
        .map(|node| doc.rendered_text(node));

    PageState {
        url: doc.url(),
        title: doc.title(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        hint_balance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    #[test]
    fn picks_first_balance_hint_in_document_order() {
        let doc = MemoryDocument::parse_html(
            "https://bank.test/account",
            r#"<html><head><title>Account</title></head><body>
                <div class="BalanceAmount">  $10.00 </div>
                <span data-balance="1">$99</span>
            </body></html>"#,
        );
        let before = chrono::Utc::now().timestamp_millis();
        let state = read_state(&doc);
        assert_eq!(state.hint_balance.as_deref(), Some("$10.00"));
        assert_eq!(state.title, "Account");
        assert_eq!(state.url, "https://bank.test/account");
        assert!(state.timestamp >= before);
    }

    #[test]
    fn hint_reads_like_rendered_text() {
        let doc = MemoryDocument::parse_html(
            "https://bank.test/",
            r#"<div class="balance">
                 <span>Available:</span>
                 <span style="display:none">(pending)</span>
                 <b>
                   1,204.50
                 </b>
               </div>"#,
        );
        assert_eq!(
            read_state(&doc).hint_balance.as_deref(),
            Some("Available: 1,204.50")
        );
    }

    #[test]
    fn no_hint_is_null() {
        let doc = MemoryDocument::parse_html("https://bank.test/", "<p class=\"balanced\">x</p>");
        assert_eq!(read_state(&doc).hint_balance, None);
    }
}
