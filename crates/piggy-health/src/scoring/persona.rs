use super::Record;
use serde::Serialize;

/// Ten-step persona ladder attached to rule scores, one step per 10 points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaLevel {
    BabySnail,
    SproutMole,
    BeanDolphin,
    AcornHamster,
    CheckPenguin,
    BalancedOtter,
    PlanFox,
    MoonRabbit,
    Owl,
    MillionaireWhale,
}

impl PersonaLevel {
    pub const ALL: [PersonaLevel; 10] = [
        PersonaLevel::BabySnail,
        PersonaLevel::SproutMole,
        PersonaLevel::BeanDolphin,
        PersonaLevel::AcornHamster,
        PersonaLevel::CheckPenguin,
        PersonaLevel::BalancedOtter,
        PersonaLevel::PlanFox,
        PersonaLevel::MoonRabbit,
        PersonaLevel::Owl,
        PersonaLevel::MillionaireWhale,
    ];

    pub fn from_score(score: f64) -> Self {
        let band = if score < 10.0 {
            0
        } else if score >= 90.0 {
            9
        } else {
            (score / 10.0).floor() as usize
        };
        Self::ALL[band.min(9)]
    }

    /// 1-based rank, 10 being the best.
    pub fn rank(self) -> u8 {
        Self::ALL
            .iter()
            .position(|level| *level == self)
            .map_or(1, |index| index as u8 + 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            PersonaLevel::BabySnail => "Baby Snail",
            PersonaLevel::SproutMole => "Sprout Mole",
            PersonaLevel::BeanDolphin => "Bean Dolphin",
            PersonaLevel::AcornHamster => "Acorn Hamster",
            PersonaLevel::CheckPenguin => "Check Penguin",
            PersonaLevel::BalancedOtter => "Balanced Otter",
            PersonaLevel::PlanFox => "Plan Fox",
            PersonaLevel::MoonRabbit => "Moon Rabbit",
            PersonaLevel::Owl => "Owl",
            PersonaLevel::MillionaireWhale => "Millionaire Whale",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            PersonaLevel::BabySnail => "🐌",
            PersonaLevel::SproutMole => "🕳️",
            PersonaLevel::BeanDolphin => "🐬",
            PersonaLevel::AcornHamster => "🐹",
            PersonaLevel::CheckPenguin => "🐧",
            PersonaLevel::BalancedOtter => "🦦",
            PersonaLevel::PlanFox => "🦊",
            PersonaLevel::MoonRabbit => "🚀",
            PersonaLevel::Owl => "🦉",
            PersonaLevel::MillionaireWhale => "🐳",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PersonaLevel::BabySnail => "Just getting started: begin by tracking every expense",
            PersonaLevel::SproutMole => "Plug the hidden leaks first by reviewing fixed costs",
            PersonaLevel::BeanDolphin => "Variable costs rock the boat; build a small saving habit",
            PersonaLevel::AcornHamster => "Saving bit by bit; aim for one month of emergency funds",
            PersonaLevel::CheckPenguin => "Cut waste by checking cards and subscriptions",
            PersonaLevel::BalancedOtter => {
                "Income and spending are stable; finish a three-month emergency fund"
            }
            PersonaLevel::PlanFox => "Planned spending with automatic saving; ready to start investing",
            PersonaLevel::MoonRabbit => "Offense and defense in balance; map out long-term goals",
            PersonaLevel::Owl => "Data-driven spending reviews and a rebalanced portfolio",
            PersonaLevel::MillionaireWhale => "Cash flow and risk fully under control",
        }
    }

    pub fn tier(self) -> PersonaTier {
        PersonaTier::ALL[(self.rank() as usize - 1) / 2]
    }
}

/// Five-step grouping of [`PersonaLevel`]s, one step per 20 points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaTier {
    Beginner,
    Novice,
    Intermediate,
    Advanced,
    Expert,
}

impl PersonaTier {
    pub const ALL: [PersonaTier; 5] = [
        PersonaTier::Beginner,
        PersonaTier::Novice,
        PersonaTier::Intermediate,
        PersonaTier::Advanced,
        PersonaTier::Expert,
    ];

    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            PersonaTier::Beginner
        } else if score < 40.0 {
            PersonaTier::Novice
        } else if score < 60.0 {
            PersonaTier::Intermediate
        } else if score < 80.0 {
            PersonaTier::Advanced
        } else {
            PersonaTier::Expert
        }
    }

    /// Zero-based index used as the persona-level column of labelled datasets.
    pub fn index(self) -> u8 {
        match self {
            PersonaTier::Beginner => 0,
            PersonaTier::Novice => 1,
            PersonaTier::Intermediate => 2,
            PersonaTier::Advanced => 3,
            PersonaTier::Expert => 4,
        }
    }
}

/// Final-score personas refined by savings and income context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    SuperSaver,
    FinanceExpert,
    SavingsMaster,
    HighIncomeStable,
    Balanced,
    Thrifty,
    Spender,
    Average,
    DeficitAlert,
    FinanceBeginner,
    DeficitRisk,
    WarningSign,
}

impl Persona {
    pub fn name(self) -> &'static str {
        match self {
            Persona::SuperSaver => "Super Saver",
            Persona::FinanceExpert => "Finance Expert",
            Persona::SavingsMaster => "Savings Master",
            Persona::HighIncomeStable => "High-Income Stable",
            Persona::Balanced => "Balanced",
            Persona::Thrifty => "Thrifty",
            Persona::Spender => "Spender",
            Persona::Average => "Average",
            Persona::DeficitAlert => "Deficit Alert",
            Persona::FinanceBeginner => "Finance Beginner",
            Persona::DeficitRisk => "Deficit Risk",
            Persona::WarningSign => "Warning Sign",
        }
    }

    pub fn mascot(self) -> &'static str {
        match self {
            Persona::SuperSaver => "lion",
            Persona::FinanceExpert => "tiger",
            Persona::SavingsMaster => "koala",
            Persona::HighIncomeStable => "elephant",
            Persona::Balanced => "panda",
            Persona::Thrifty => "rabbit",
            Persona::Spender => "squirrel",
            Persona::Average => "cat",
            Persona::DeficitAlert => "dog",
            Persona::FinanceBeginner => "hamster",
            Persona::DeficitRisk => "fox",
            Persona::WarningSign => "wolf",
        }
    }

    /// 5 for the top band down to 1.
    pub fn level(self) -> u8 {
        match self {
            Persona::SuperSaver | Persona::FinanceExpert => 5,
            Persona::SavingsMaster | Persona::HighIncomeStable | Persona::Balanced => 4,
            Persona::Thrifty | Persona::Spender | Persona::Average => 3,
            Persona::DeficitAlert | Persona::FinanceBeginner => 2,
            Persona::DeficitRisk | Persona::WarningSign => 1,
        }
    }

    fn describe(self, savings_rate: f64) -> String {
        let percent = (savings_rate * 100.0).round();
        let deficit = (savings_rate.abs() * 100.0).round();
        match self {
            Persona::SuperSaver => format!("Saving {percent:.0}% a month: a master of money"),
            Persona::FinanceExpert => "Outstanding financial management".to_string(),
            Persona::SavingsMaster => format!("Steady management with {percent:.0}% saved monthly"),
            Persona::HighIncomeStable => "A stable life backed by a high income".to_string(),
            Persona::Balanced => "A sound balance of spending and saving".to_string(),
            Persona::Thrifty => format!("Building up steadily at {percent:.0}% savings"),
            Persona::Spender => "Spending needs more attention".to_string(),
            Persona::Average => "A little more care will go a long way".to_string(),
            Persona::DeficitAlert => {
                format!("Running a {deficit:.0}% monthly deficit; cut spending")
            }
            Persona::FinanceBeginner => "Time to learn the basics of money management".to_string(),
            Persona::DeficitRisk => {
                format!("Severe {deficit:.0}% deficit; urgent improvement needed")
            }
            Persona::WarningSign => "The financial situation needs urgent repair".to_string(),
        }
    }
}

/// Persona as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaDescriptor {
    pub persona: Persona,
    pub name: &'static str,
    pub emoji: &'static str,
    pub description: String,
    pub level: u8,
}

/// Maps a final score and household context to a [`Persona`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonaAssigner;

impl PersonaAssigner {
    pub fn classify(score: f64, savings_rate: f64, income: f64, total_spending: f64) -> Persona {
        if score >= 80.0 {
            if savings_rate >= 0.3 {
                Persona::SuperSaver
            } else {
                Persona::FinanceExpert
            }
        } else if score >= 60.0 {
            if savings_rate >= 0.2 {
                Persona::SavingsMaster
            } else if income >= 500.0 {
                Persona::HighIncomeStable
            } else {
                Persona::Balanced
            }
        } else if score >= 40.0 {
            if savings_rate > 0.0 {
                Persona::Thrifty
            } else if total_spending > income * 0.9 {
                Persona::Spender
            } else {
                Persona::Average
            }
        } else if score >= 20.0 {
            if savings_rate < 0.0 {
                Persona::DeficitAlert
            } else {
                Persona::FinanceBeginner
            }
        } else if savings_rate < -0.2 {
            Persona::DeficitRisk
        } else {
            Persona::WarningSign
        }
    }

    pub fn describe(
        score: f64,
        savings_rate: f64,
        income: f64,
        total_spending: f64,
    ) -> PersonaDescriptor {
        let persona = Self::classify(score, savings_rate, income, total_spending);
        PersonaDescriptor {
            persona,
            name: persona.name(),
            emoji: persona.mascot(),
            description: persona.describe(savings_rate),
            level: persona.level(),
        }
    }

    pub fn assign(score: f64, record: &Record) -> PersonaDescriptor {
        let savings = record.savings();
        Self::describe(score, savings.rate, record.income, record.total_spending)
    }
}
