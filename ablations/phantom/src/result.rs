//! 实验结果.

use crate::profile::Profile;
use std::io::{self, Write};

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Computed samples: {}", p.get_cases())?;
    writeln!(w, "{S4}Degenerate samples: {}", p.get_degenerate())?;
    writeln!(w, "{S4}Gradient total time: {} us", p.get_case_time_us())?;
    writeln!(
        w,
        "{S4}Gradient average time: {} us",
        f64_to_display(p.get_avg_case_time_us())
    )?;
    writeln!(w, "{S4}Total machine time: {} us", p.get_real_time_us())?;
    writeln!(w, "{S4}Average loss: {}", f64_to_display(p.get_avg_loss()))?;
    writeln!(
        w,
        "{S4}Average rand index: {}",
        f64_to_display(p.get_avg_rand_index())
    )?;
    let t = p
        .get_most_time_consuming()
        .map(|d| d.as_micros().to_string());
    write!(
        w,
        "{S4}Most time-consuming sample costs {} us",
        t.as_deref().unwrap_or("/")
    )?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(&'static str, Profile)>,
}

impl AblationResult {
    pub fn from_iter<I: IntoIterator<Item = (&'static str, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, profile) in self.data.iter() {
            describe_into(key, profile, &mut buf).expect("Writing into memory error");
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();

            utils::sep();
        }
    }
}
