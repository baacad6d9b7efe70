//! Single-page demo UI served at `/`.
//!
//! One HTML template; the task decides the title, the endpoints, the
//! request field names and which tuning inputs are shown.

use crate::domain::task::Task;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Summarize AI · {{TITLE}}</title>
<style>
  body   { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; color: #1d1d1f; }
  h1     { font-size: 1.5rem; margin-bottom: .25rem; }
  .badge { display: inline-block; font-size: .8rem; padding: .15rem .6rem; border-radius: 1rem; background: #eee; }
  .online  { background: #d6f5dd; }
  .offline { background: #fbd9d9; }
  textarea { width: 100%; min-height: 180px; font: inherit; padding: .6rem; box-sizing: border-box; }
  .params  { display: flex; flex-wrap: wrap; gap: 1rem; margin: .75rem 0; }
  .params label { font-size: .85rem; display: flex; flex-direction: column; }
  .params input { width: 6rem; }
  button   { padding: .5rem 1.2rem; font: inherit; cursor: pointer; }
  #output  { white-space: pre-wrap; background: #f6f6f8; padding: .8rem; min-height: 3rem; margin-top: 1rem; }
  #stats   { font-size: .8rem; color: #666; margin-top: .4rem; }
  #error   { color: #b00020; margin-top: .5rem; }
</style>
</head>
<body>
<h1>{{TITLE}}</h1>
<span id="status" class="badge">Checking...</span>
<p>{{BLURB}}</p>
<textarea id="input" placeholder="{{PLACEHOLDER}}"></textarea>
<div class="params">{{PARAMS}}</div>
<button id="run">{{BUTTON}}</button>
<div id="error"></div>
<div id="output"></div>
<div id="stats"></div>
<script>
const FIELD  = "{{FIELD}}";
const RESULT = "{{RESULT}}";
const status = document.getElementById("status");

fetch("{{HEALTH}}").then(r => r.json()).then(d => {
  status.textContent = d.model_loaded ? "Model Ready" : "No Model";
  status.className   = "badge " + (d.model_loaded ? "online" : "offline");
}).catch(() => { status.textContent = "API Offline"; status.className = "badge offline"; });

document.getElementById("run").addEventListener("click", async () => {
  const err = document.getElementById("error");
  const out = document.getElementById("output");
  const st  = document.getElementById("stats");
  err.textContent = ""; out.textContent = ""; st.textContent = "";

  const body = { [FIELD]: document.getElementById("input").value };
  document.querySelectorAll(".params input").forEach(i => { body[i.name] = Number(i.value); });

  try {
    const res  = await fetch("{{ENDPOINT}}", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify(body),
    });
    const data = await res.json();
    if (!res.ok) {
      const d = data.detail;
      throw new Error(Array.isArray(d) ? d.map(e => e.loc.slice(1).join(".") + ": " + e.msg).join("; ") : d);
    }
    out.textContent = data[RESULT];
    st.textContent  = data.input_length + " → " + data.output_length + " words in " + data.processing_time + "s";
  } catch (e) {
    err.textContent = e.message || "Something went wrong. Is the API running?";
  }
});
</script>
</body>
</html>
"#;

fn number_input(name: &str, label: &str, value: &str, min: &str, max: &str, step: &str) -> String {
    format!(
        r#"<label>{label}<input type="number" name="{name}" value="{value}" min="{min}" max="{max}" step="{step}"></label>"#
    )
}

/// Demo page for `task`.
pub fn page(task: Task) -> String {
    let (title, blurb, placeholder, button, field, result, endpoint, health, params) = match task {
        Task::Summarization => (
            "Text Summarizer",
            "Paste a passage and get a short abstractive summary from the fine-tuned T5 model.",
            "Paste at least 10 characters of text...",
            "Summarize",
            "text",
            "summary",
            "/api/summarize",
            "/api/health",
            [
                number_input("max_length", "Max length", "128", "10", "512", "1"),
                number_input("num_beams", "Beams", "4", "1", "10", "1"),
            ]
            .concat(),
        ),
        Task::TextGeneration => (
            "Text Generator",
            "Give a one-line summary and the fine-tuned GPT-2 model expands it into full text.",
            "Write a short summary (at least 5 characters)...",
            "Generate",
            "summary",
            "generated_text",
            "/api/generate",
            "/api/generate/health",
            [
                number_input("max_length", "Max tokens", "200", "50", "512", "1"),
                number_input("temperature", "Temperature", "0.7", "0.1", "2.0", "0.1"),
                number_input("top_k", "Top-k", "40", "1", "100", "1"),
                number_input("top_p", "Top-p", "0.9", "0.1", "1.0", "0.05"),
            ]
            .concat(),
        ),
    };

    TEMPLATE
        .replace("{{TITLE}}", title)
        .replace("{{BLURB}}", blurb)
        .replace("{{PLACEHOLDER}}", placeholder)
        .replace("{{BUTTON}}", button)
        .replace("{{FIELD}}", field)
        .replace("{{RESULT}}", result)
        .replace("{{ENDPOINT}}", endpoint)
        .replace("{{HEALTH}}", health)
        .replace("{{PARAMS}}", &params)
}
