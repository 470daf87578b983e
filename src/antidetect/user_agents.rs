use crate::config::UserAgentConfig;
use crate::state::DomainState;
use rand::seq::SliceRandom;
use rand::Rng;

const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

const MOBILE_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Desktop and mobile user agent pools with per-domain rotation
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    desktop: Vec<String>,
    mobile: Vec<String>,
    desktop_ratio: f64,
    rotate_every: u32,
}

impl UserAgentPool {
    pub fn from_config(config: &UserAgentConfig) -> Self {
        let or_builtin = |agents: &[String], builtin: &[&str]| {
            if agents.is_empty() {
                builtin.iter().map(|s| s.to_string()).collect()
            } else {
                agents.to_vec()
            }
        };

        Self {
            desktop: or_builtin(&config.desktop, DESKTOP_AGENTS),
            mobile: or_builtin(&config.mobile, MOBILE_AGENTS),
            desktop_ratio: config.desktop_ratio.clamp(0.0, 1.0),
            rotate_every: config.rotate_every.max(1),
        }
    }

    /// Picks a fresh agent, desktop with probability `desktop_ratio`
    pub fn pick<R: Rng>(&self, rng: &mut R) -> String {
        let pool = if rng.gen_bool(self.desktop_ratio) {
            &self.desktop
        } else {
            &self.mobile
        };

        pool.choose(rng)
            .or_else(|| self.desktop.first())
            .cloned()
            .unwrap_or_else(|| DESKTOP_AGENTS[0].to_string())
    }

    /// Returns the agent to present to the domain, rotating when due
    ///
    /// A domain keeps its agent for `rotate_every` requests; the counter is
    /// advanced by [`DomainState::record_request`].
    pub fn agent_for<R: Rng>(&self, state: &mut DomainState, rng: &mut R) -> String {
        let due = state.requests_since_rotation >= self.rotate_every;

        match &state.current_user_agent {
            Some(agent) if !due => agent.clone(),
            _ => {
                let agent = self.pick(rng);
                state.current_user_agent = Some(agent.clone());
                state.requests_since_rotation = 0;
                agent
            }
        }
    }

    pub fn is_mobile(&self, agent: &str) -> bool {
        self.mobile.iter().any(|a| a == agent)
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::from_config(&UserAgentConfig::default())
    }
}
