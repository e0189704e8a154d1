//! Renderable layer names.
//!
//! A layer name is the stable string contract shared with the map/WMS side:
//!
//! ```text
//! area/<id>
//! raster/<dataset>[/<variable>[/<time_period>]]
//! vector/<dataset>[/<variable>[/<time_period>]]
//! cm/<cm_name>/<task_id>
//! ```
//!
//! Components are URL-encoded, so names survive path segments and query
//! strings unchanged.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LayerNameError {
    #[error("empty layer name")]
    Empty,

    #[error("unknown layer kind '{0}'")]
    UnknownKind(String),

    #[error("malformed layer name '{0}'")]
    Malformed(String),

    #[error("invalid encoding in layer name: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerName {
    /// Selection-area layer, e.g. `area/NUTS2`.
    Area { id: String },

    /// Raster dataset layer, optionally narrowed to a variable and period.
    Raster {
        dataset: String,
        variable: Option<String>,
        time_period: Option<String>,
    },

    /// Vector dataset layer, same addressing as rasters.
    Vector {
        dataset: String,
        variable: Option<String>,
        time_period: Option<String>,
    },

    /// Layer produced by a finished calculation task.
    Cm { cm_name: String, task_id: Uuid },
}

impl LayerName {
    pub fn area(id: &str) -> Self {
        Self::Area { id: id.to_string() }
    }

    pub fn cm(cm_name: &str, task_id: Uuid) -> Self {
        Self::Cm {
            cm_name: cm_name.to_string(),
            task_id,
        }
    }
}

fn push_dataset_parts(
    f: &mut fmt::Formatter<'_>,
    dataset: &str,
    variable: &Option<String>,
    time_period: &Option<String>,
) -> fmt::Result {
    write!(f, "/{}", urlencoding::encode(dataset))?;
    if let Some(variable) = variable {
        write!(f, "/{}", urlencoding::encode(variable))?;
        if let Some(period) = time_period {
            write!(f, "/{}", urlencoding::encode(period))?;
        }
    }
    Ok(())
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerName::Area { id } => write!(f, "area/{}", urlencoding::encode(id)),
            LayerName::Raster {
                dataset,
                variable,
                time_period,
            } => {
                write!(f, "raster")?;
                push_dataset_parts(f, dataset, variable, time_period)
            }
            LayerName::Vector {
                dataset,
                variable,
                time_period,
            } => {
                write!(f, "vector")?;
                push_dataset_parts(f, dataset, variable, time_period)
            }
            LayerName::Cm { cm_name, task_id } => {
                write!(f, "cm/{}/{}", urlencoding::encode(cm_name), task_id)
            }
        }
    }
}

fn dataset_parts(
    rest: &[String],
    raw: &str,
) -> Result<(String, Option<String>, Option<String>), LayerNameError> {
    match rest {
        [dataset] => Ok((dataset.clone(), None, None)),
        [dataset, variable] => Ok((dataset.clone(), Some(variable.clone()), None)),
        [dataset, variable, period] => Ok((
            dataset.clone(),
            Some(variable.clone()),
            Some(period.clone()),
        )),
        _ => Err(LayerNameError::Malformed(raw.to_string())),
    }
}

impl FromStr for LayerName {
    type Err = LayerNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(LayerNameError::Empty);
        }
        let parts: Vec<String> = s
            .split('/')
            .map(|part| urlencoding::decode(part).map(|c| c.into_owned()))
            .collect::<Result<_, _>>()
            .map_err(|e| LayerNameError::Encoding(e.to_string()))?;
        let (kind, rest) = parts
            .split_first()
            .ok_or(LayerNameError::Empty)?;

        match kind.as_str() {
            "area" => match rest {
                [id] => Ok(LayerName::Area { id: id.clone() }),
                _ => Err(LayerNameError::Malformed(s.to_string())),
            },
            "raster" => {
                let (dataset, variable, time_period) = dataset_parts(rest, s)?;
                Ok(LayerName::Raster {
                    dataset,
                    variable,
                    time_period,
                })
            }
            "vector" => {
                let (dataset, variable, time_period) = dataset_parts(rest, s)?;
                Ok(LayerName::Vector {
                    dataset,
                    variable,
                    time_period,
                })
            }
            "cm" => match rest {
                [cm_name, task_id] => {
                    let task_id = Uuid::parse_str(task_id)
                        .map_err(|_| LayerNameError::Malformed(s.to_string()))?;
                    Ok(LayerName::Cm {
                        cm_name: cm_name.clone(),
                        task_id,
                    })
                }
                _ => Err(LayerNameError::Malformed(s.to_string())),
            },
            other => Err(LayerNameError::UnknownKind(other.to_string())),
        }
    }
}
