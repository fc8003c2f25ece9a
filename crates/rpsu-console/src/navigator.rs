//! The fixed menu script that turns an open session into a [`Reading`].
//!
//! The console has no query language, only numbered menus, so one cycle is a
//! hard-coded walk:
//!
//! | Step | Command | Delay | Purpose |
//! |---|---|---|---|
//! | 1 | `2` | menu | enter the device submenu |
//! | 2 | `STATUS` | menu | overall status; only source of the temperature |
//! | 3 | `%1`, `ECHO` | menu | board listing |
//! | 4 | | | abort unless the listing names the RPSU board |
//! | 5 | `%1<board>`, `1`, `SHOW` | menu, menu, dump | select the board and dump it |
//! | 6 | | | extract status, uptime, voltage, current, leak current |
//!
//! Step 2 is skipped when the profile does not read temperature.

use chrono::Local;
use rpsu_types::{EngineProfile, Reading, RpsuError, SessionState};
use tracing::debug;

use crate::extract::{extract_rpsu_status, extract_temperature, extract_uptime, extract_value};
use crate::sanitize::sanitize;
use crate::transport::SessionTransport;

/// Drives one session through the menu script of an [`EngineProfile`].
#[derive(Debug, Clone, Default)]
pub struct MenuNavigator {
    profile: EngineProfile,
}

impl MenuNavigator {
    pub fn new(profile: EngineProfile) -> Self {
        Self { profile }
    }

    /// Run one full cycle on `session` and assemble the reading.
    ///
    /// `state` is advanced to `NavigatingMenu` on entry and to
    /// `AwaitingDump` right before `SHOW`; it is left where the script
    /// stopped on error. The session is not closed here.
    ///
    /// # Errors
    ///
    /// - [`RpsuError::SubmenuNotFound`] when the board listing lacks the
    ///   board address; no command is sent after `ECHO` in that case.
    /// - [`RpsuError::Transport`] for any I/O failure along the way.
    pub async fn navigate(
        &self,
        session: &mut dyn SessionTransport,
        state: &mut SessionState,
    ) -> Result<Reading, RpsuError> {
        let menu = self.profile.menu_delay;
        *state = SessionState::NavigatingMenu;

        session.send("2", menu).await?;

        let temperature = if self.profile.read_temperature {
            let status = sanitize(&session.send("STATUS", menu).await?);
            Some(extract_temperature(&status))
        } else {
            None
        };

        session.send("%1", menu).await?;
        let listing = sanitize(&session.send("ECHO", menu).await?);
        let board = &self.profile.board_address;
        if !listing.contains(board.as_str()) {
            debug!(board = %board, listing = %listing, "board missing from listing");
            return Err(RpsuError::SubmenuNotFound {
                board: board.clone(),
            });
        }

        session.send(&format!("%1{board}"), menu).await?;
        session.send("1", menu).await?;

        *state = SessionState::AwaitingDump;
        let dump = sanitize(&session.send("SHOW", self.profile.dump_delay).await?);

        Ok(Reading::builder(Local::now())
            .status(extract_rpsu_status(&dump))
            .uptime_hours(extract_uptime(&dump))
            .voltage(extract_value(&dump, "Voltage"))
            .current_ma(extract_value(&dump, "Current"))
            .leak_current_ma(extract_value(&dump, "Leak Current"))
            .temperature_c(temperature)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rpsu_types::RpsuStatus;

    use super::*;
    use crate::sim::SimConsole;

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_parses_dump_and_temperature() {
        let mut console = SimConsole::healthy()
            .reply("STATUS", "Temperature : 41.0 C")
            .reply(
                "SHOW",
                "RPSU Status=ON\r\nRPSU Uptime=120\r\nVoltage: 48.0\r\nCurrent: 500\r\nLeak Current: 2\r\n",
            );
        let log = console.clone();
        let mut state = SessionState::Connected;

        let reading = MenuNavigator::new(EngineProfile::full())
            .navigate(&mut console, &mut state)
            .await
            .unwrap();

        assert_eq!(reading.status(), RpsuStatus::On);
        assert_eq!(reading.uptime_hours(), 120);
        assert_eq!(reading.voltage(), "48.0");
        assert_eq!(reading.current_ma(), "500");
        assert_eq!(reading.leak_current_ma(), "2");
        assert_eq!(reading.temperature_c(), Some("41.0"));
        assert!(reading.temperature_alert());
        assert_eq!(state, SessionState::AwaitingDump);
        assert_eq!(
            log.commands(),
            commands(&["2", "STATUS", "%1", "ECHO", "%104", "1", "SHOW"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn decorated_replies_are_sanitized_before_extraction() {
        let mut console = SimConsole::healthy();
        let mut state = SessionState::Connected;
        let reading = MenuNavigator::default()
            .navigate(&mut console, &mut state)
            .await
            .unwrap();
        assert_eq!(reading.status(), RpsuStatus::On);
        assert_eq!(reading.uptime_hours(), 87);
        assert_eq!(reading.voltage(), "53.6");
        assert_eq!(reading.temperature_c(), Some("27.5"));
        assert!(!reading.temperature_alert());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_board_stops_before_show() {
        let mut console = SimConsole::healthy().reply("ECHO", "Boards: 01 02 03");
        let log = console.clone();
        let mut state = SessionState::Connected;

        let result = MenuNavigator::new(EngineProfile::full())
            .navigate(&mut console, &mut state)
            .await;

        assert_eq!(
            result,
            Err(RpsuError::SubmenuNotFound {
                board: "04".to_string()
            })
        );
        assert_eq!(log.commands(), commands(&["2", "STATUS", "%1", "ECHO"]));
        assert_eq!(state, SessionState::NavigatingMenu);
    }

    #[tokio::test(start_paused = true)]
    async fn reduced_profile_skips_status_and_temperature() {
        let mut console = SimConsole::healthy();
        let log = console.clone();
        let mut state = SessionState::Connected;
        let start = tokio::time::Instant::now();

        let reading = MenuNavigator::new(EngineProfile::reduced())
            .navigate(&mut console, &mut state)
            .await
            .unwrap();

        assert_eq!(reading.temperature_c(), None);
        assert_eq!(
            log.commands(),
            commands(&["2", "%1", "ECHO", "%104", "1", "SHOW"])
        );
        // Five menu steps at 2 s plus the 3 s dump.
        assert_eq!(start.elapsed(), Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_dump_degrades_to_defaults() {
        let mut console = SimConsole::healthy().reply("SHOW", "").reply("STATUS", "");
        let mut state = SessionState::Connected;
        let reading = MenuNavigator::default()
            .navigate(&mut console, &mut state)
            .await
            .unwrap();
        assert_eq!(reading.status(), RpsuStatus::Off);
        assert_eq!(reading.uptime_hours(), 0);
        assert_eq!(reading.voltage(), "0");
        assert_eq!(reading.current_ma(), "0");
        assert_eq!(reading.leak_current_ma(), "0");
        assert_eq!(reading.temperature_c(), Some("0.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_mid_script_is_propagated() {
        let mut console = SimConsole::healthy().fail_on("%104");
        let log = console.clone();
        let mut state = SessionState::Connected;
        let result = MenuNavigator::default()
            .navigate(&mut console, &mut state)
            .await;
        assert!(matches!(result, Err(RpsuError::Transport(_))));
        assert_eq!(log.commands().last().map(String::as_str), Some("%104"));
    }
}
