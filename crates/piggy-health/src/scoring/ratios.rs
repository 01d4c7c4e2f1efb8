use serde::{Deserialize, Serialize};

/// Spending categories tracked by every scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Housing,
    Food,
    Transport,
    Entertainment,
    Education,
    Medical,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Housing,
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Education,
        Category::Medical,
        Category::Other,
    ];

    /// Category that absorbs the whole budget when no spending was recorded.
    pub const FALLBACK: Category = Category::Other;

    pub fn key(self) -> &'static str {
        match self {
            Category::Housing => "housing",
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Entertainment => "entertainment",
            Category::Education => "education",
            Category::Medical => "medical",
            Category::Other => "other",
        }
    }

    /// Column header used by the national household survey exports.
    pub fn survey_header(self) -> &'static str {
        match self {
            Category::Housing => "주거",
            Category::Food => "식료품음료",
            Category::Transport => "교통",
            Category::Entertainment => "오락문화",
            Category::Education => "교육육아",
            Category::Medical => "보건의료",
            Category::Other => "기타소비",
        }
    }

    fn index(self) -> usize {
        match self {
            Category::Housing => 0,
            Category::Food => 1,
            Category::Transport => 2,
            Category::Entertainment => 3,
            Category::Education => 4,
            Category::Medical => 5,
            Category::Other => 6,
        }
    }
}

/// Ratios as they arrive from callers: possibly missing, negative, or NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRatios {
    pub housing: Option<f64>,
    pub food: Option<f64>,
    pub transport: Option<f64>,
    pub entertainment: Option<f64>,
    pub education: Option<f64>,
    pub medical: Option<f64>,
    pub other: Option<f64>,
}

impl RawRatios {
    pub fn get(&self, category: Category) -> Option<f64> {
        match category {
            Category::Housing => self.housing,
            Category::Food => self.food,
            Category::Transport => self.transport,
            Category::Entertainment => self.entertainment,
            Category::Education => self.education,
            Category::Medical => self.medical,
            Category::Other => self.other,
        }
    }

    pub fn set(&mut self, category: Category, value: Option<f64>) {
        let slot = match category {
            Category::Housing => &mut self.housing,
            Category::Food => &mut self.food,
            Category::Transport => &mut self.transport,
            Category::Entertainment => &mut self.entertainment,
            Category::Education => &mut self.education,
            Category::Medical => &mut self.medical,
            Category::Other => &mut self.other,
        };
        *slot = value;
    }

    /// Sum of the present, finite values. Used by training-data validation before any
    /// clipping happens.
    pub fn present_sum(&self) -> f64 {
        Category::ALL
            .iter()
            .filter_map(|category| self.get(*category))
            .filter(|value| value.is_finite())
            .sum()
    }
}

impl From<CategoryRatios> for RawRatios {
    fn from(ratios: CategoryRatios) -> Self {
        let mut raw = RawRatios::default();
        for category in Category::ALL {
            raw.set(category, Some(ratios.get(category)));
        }
        raw
    }
}

/// Closed simplex of category ratios: every value non-negative, summing to 1.
///
/// Only [`RatioNormalizer`] constructs values of this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryRatios {
    values: [f64; 7],
}

impl CategoryRatios {
    pub fn get(&self, category: Category) -> f64 {
        self.values[category.index()]
    }

    pub fn housing(&self) -> f64 {
        self.get(Category::Housing)
    }

    pub fn food(&self) -> f64 {
        self.get(Category::Food)
    }

    pub fn transport(&self) -> f64 {
        self.get(Category::Transport)
    }

    pub fn entertainment(&self) -> f64 {
        self.get(Category::Entertainment)
    }

    pub fn education(&self) -> f64 {
        self.get(Category::Education)
    }

    pub fn medical(&self) -> f64 {
        self.get(Category::Medical)
    }

    pub fn other(&self) -> f64 {
        self.get(Category::Other)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL
            .iter()
            .map(move |category| (*category, self.get(*category)))
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sample standard deviation (n - 1 denominator) across the seven ratios.
    pub fn sample_std(&self) -> f64 {
        let n = self.values.len() as f64;
        let mean = self.sum() / n;
        let squared: f64 = self
            .values
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum();
        (squared / (n - 1.0)).sqrt()
    }
}

/// Tolerance under which a ratio set already counts as normalized.
const SIMPLEX_TOLERANCE: f64 = 1e-9;

/// Clips and renormalizes raw category ratios onto the simplex.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioNormalizer;

impl RatioNormalizer {
    pub fn normalize(raw: &RawRatios) -> CategoryRatios {
        let mut values = [0.0; 7];
        for category in Category::ALL {
            values[category.index()] = match raw.get(category) {
                Some(value) if value.is_finite() && value > 0.0 => value,
                _ => 0.0,
            };
        }

        let sum: f64 = values.iter().sum();
        if sum == 0.0 {
            values[Category::FALLBACK.index()] = 1.0;
        } else if (sum - 1.0).abs() > SIMPLEX_TOLERANCE {
            for value in values.iter_mut() {
                *value /= sum;
            }
        }

        CategoryRatios { values }
    }
}
