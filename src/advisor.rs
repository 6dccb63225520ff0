// Ties the commute collector to the language model: one report, one prompt,
// one recommendation per request.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::commute::{self, DepartureWindow, Route};
use crate::gemini::{self, GeminiError, LanguageModel};
use crate::vvs_api_models::{TripSource, VvsError};

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("GEMINI_API_KEY not configured")]
    MissingApiKey,
    #[error("No trips available in the departure window")]
    NoTripsAvailable,
    #[error(transparent)]
    Transit(#[from] VvsError),
    #[error(transparent)]
    Model(#[from] GeminiError),
}

/// Response payload: the report the model saw and what it said.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub trip_data: String,
    pub recommendation: String,
}

#[derive(Clone)]
pub struct CommuteAdvisor {
    trips: Arc<dyn TripSource>,
    /// `None` when no API key was configured at startup.
    model: Option<Arc<dyn LanguageModel>>,
    model_name: String,
    route: Route,
    window: DepartureWindow,
}

impl CommuteAdvisor {
    pub fn new(
        trips: Arc<dyn TripSource>,
        model: Option<Arc<dyn LanguageModel>>,
        model_name: impl Into<String>,
        window: DepartureWindow,
    ) -> Self {
        CommuteAdvisor {
            trips,
            model,
            model_name: model_name.into(),
            route: Route::stuttgart_commute(),
            window,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Blocking: issues one trip query per departure and one model call.
    pub fn recommend(&self, date: NaiveDate) -> Result<Recommendation, AdvisorError> {
        let model = self.model.as_ref().ok_or(AdvisorError::MissingApiKey)?;

        let report = commute::collect(self.trips.as_ref(), &self.route, &self.window, date)?;
        if !report.has_trips() {
            return Err(AdvisorError::NoTripsAvailable);
        }

        let trip_data = report.render();
        let prompt = gemini::build_prompt(&trip_data);
        let recommendation = model.generate(&self.model_name, &prompt)?;
        log::info!("Recommendation: {}", recommendation);

        Ok(Recommendation {
            trip_data,
            recommendation,
        })
    }
}
