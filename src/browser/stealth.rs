use rand::Rng;

pub struct UserAgentGenerator {
    user_agents: Vec<String>,
}

impl UserAgentGenerator {
    pub fn new() -> Self {
        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.7339.82 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".to_string(),
        ];

        Self { user_agents }
    }

    /// The fixed desktop agent used when randomization is off.
    pub fn default_user_agent(&self) -> &str {
        &self.user_agents[0]
    }

    pub fn random_user_agent(&self) -> &str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.user_agents.len());
        &self.user_agents[index]
    }
}

impl Default for UserAgentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

const VIEWPORTS: [ViewportSize; 4] = [
    ViewportSize { width: 1920, height: 1080 },
    ViewportSize { width: 1536, height: 864 },
    ViewportSize { width: 1440, height: 900 },
    ViewportSize { width: 1366, height: 768 },
];

impl ViewportSize {
    pub fn desktop() -> Self {
        VIEWPORTS[0]
    }

    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())]
    }
}
