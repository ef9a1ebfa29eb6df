use crate::config::extension_window;
use anyhow::Result;

#[test]
fn extension_window_is_bounded() -> Result<()> {
    assert_eq!(extension_window(0)?, chrono::Duration::zero());
    assert_eq!(extension_window(120)?, chrono::Duration::seconds(120));
    assert!(extension_window(7 * 24 * 60 * 60).is_ok());
    assert!(extension_window(7 * 24 * 60 * 60 + 1).is_err());
    assert!(extension_window(u64::MAX).is_err());
    Ok(())
}
