mod desc;
mod results;
mod spec;

pub use desc::{OptionDescription, SurveyDescription, SurveySummary};
pub use results::{OptionResult, SurveyResults};
pub use spec::{
    merge_options, normalize_tags, OptionSpec, PublishedChanges, PublishedEdit, SurveyContent,
    SurveySpec, MAX_LABEL_LENGTH, MAX_TAG_LENGTH, MAX_TITLE_LENGTH,
};
