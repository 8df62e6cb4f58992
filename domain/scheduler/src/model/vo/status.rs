use std::str::FromStr;

/// LSF job status as printed in the `STAT` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Run,
    Prov,
    Psusp,
    Ususp,
    Ssusp,
    Pend,
    Wait,
    Unknown,
    Done,
    Exit,
    Zombi,
}

impl JobStatus {
    /// Presentation rank, higher is listed first.
    pub const fn rank(self) -> u8 {
        match self {
            JobStatus::Run | JobStatus::Prov => 4,
            JobStatus::Psusp | JobStatus::Ususp | JobStatus::Ssusp => 3,
            JobStatus::Pend | JobStatus::Wait => 2,
            JobStatus::Unknown => 1,
            JobStatus::Done | JobStatus::Exit | JobStatus::Zombi => 0,
        }
    }
}

impl FromStr for JobStatus {
    type Err = std::convert::Infallible;

    // Anything LSF adds later is ranked like UNKWN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RUN" => Self::Run,
            "PROV" => Self::Prov,
            "PSUSP" => Self::Psusp,
            "USUSP" => Self::Ususp,
            "SSUSP" => Self::Ssusp,
            "PEND" => Self::Pend,
            "WAIT" => Self::Wait,
            "DONE" => Self::Done,
            "EXIT" => Self::Exit,
            "ZOMBI" => Self::Zombi,
            _ => Self::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus;

    #[test]
    fn test_rank() {
        let ranks: Vec<u8> = ["RUN", "PROV", "SSUSP", "PEND", "UNKWN", "DONE", "EXIT", "FOO"]
            .iter()
            .map(|s| s.parse::<JobStatus>().unwrap().rank())
            .collect();
        assert_eq!(ranks, vec![4, 4, 3, 2, 1, 0, 0, 1]);
    }
}
